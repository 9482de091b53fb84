// 签名与随机工具函数
// 提供规范化JSON编码、HMAC-SHA256签名验证以及交易参考号生成

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use serde_json::ser::{CompactFormatter, Serializer};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// 参考号随机后缀字符集 (大写字母 + 数字)
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 参考号随机后缀长度
pub const REFERENCE_SUFFIX_LEN: usize = 8;

/// 签名相关错误
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("payload could not be canonicalized: {0}")]
    Canonicalize(#[from] serde_json::Error),
    #[error("canonical payload is not valid UTF-8")]
    Encoding,
    #[error("signing secret is empty")]
    EmptySecret,
    #[error("invalid HMAC key")]
    InvalidKey,
}

/// 将载荷编码为规范化的紧凑JSON
///
/// 键保持接收时的原始顺序，数字保持发送方的原文，`,` 与 `:` 之间无空白，
/// 非ASCII字符按UTF-8原样输出，仅控制字符被转义。
pub fn canonicalize<T: Serialize + ?Sized>(payload: &T) -> Result<String, SignatureError> {
    let mut buf = Vec::with_capacity(256);
    let mut serializer = Serializer::with_formatter(&mut buf, CompactFormatter);
    payload.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|_| SignatureError::Encoding)
}

/// 生成HMAC-SHA256签名
///
/// # Arguments
/// * `secret` - 共享密钥
/// * `payload` - 要签名的载荷
///
/// # Returns
/// * 小写十六进制格式的签名字符串
pub fn sign<T: Serialize + ?Sized>(secret: &str, payload: &T) -> Result<String, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }

    let message = canonicalize(payload)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(message.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 验证HMAC-SHA256签名
///
/// 密钥或签名为空、签名不是合法的十六进制时均返回 false。
/// 摘要比较使用常量时间实现。
///
/// # Arguments
/// * `secret` - 共享密钥
/// * `payload` - 接收到的载荷
/// * `signature` - 提供方给出的签名 (可带 `sha256=` 前缀)
pub fn verify<T: Serialize + ?Sized>(secret: &str, payload: &T, signature: &str) -> bool {
    if secret.is_empty() {
        log::warn!("security: webhook secret is not configured, rejecting signature");
        return false;
    }

    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    if signature.is_empty() {
        log::warn!("security: empty webhook signature");
        return false;
    }

    let expected = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("security: webhook signature is not valid hex: {}", e);
            return false;
        }
    };

    let message = match canonicalize(payload) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("security: failed to canonicalize webhook payload: {}", e);
            return false;
        }
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(message.as_bytes());

    mac.verify_slice(&expected).is_ok()
}

/// 生成随机大写字母数字串
pub fn generate_reference_suffix(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| REFERENCE_CHARSET[rng.gen_range(0..REFERENCE_CHARSET.len())] as char)
        .collect()
}

/// 生成交易参考号
///
/// 格式: `TXN-{unix秒}-{8位大写字母数字}`
pub fn generate_reference(now: DateTime<Utc>) -> String {
    format!(
        "TXN-{}-{}",
        now.timestamp(),
        generate_reference_suffix(REFERENCE_SUFFIX_LEN)
    )
}
