// 数据验证工具函数
// 提供输入数据验证和格式规范化功能

use anyhow::Result;

/// 布基纳法索国际区号
pub const COUNTRY_CODE: &str = "226";

/// 将电话号码规范化为国际格式 (226XXXXXXXX)
///
/// 去除所有非数字字符；以 `0` 开头时替换为区号，未带区号时补上区号。
///
/// # Arguments
/// * `phone` - 原始电话号码
///
/// # Returns
/// * 规范化后的号码 (不含 `+`)
pub fn normalize_phone_number(phone: &str) -> Result<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        anyhow::bail!("Phone number has no digits: {:?}", phone);
    }

    let normalized = if let Some(local) = digits.strip_prefix('0') {
        format!("{}{}", COUNTRY_CODE, local)
    } else if digits.starts_with(COUNTRY_CODE) {
        digits
    } else {
        format!("{}{}", COUNTRY_CODE, digits)
    };

    Ok(normalized)
}

/// 验证业务申请ID
pub fn validate_request_id(request_id: i64) -> Result<()> {
    if request_id <= 0 {
        anyhow::bail!("Request id must be positive");
    }
    Ok(())
}

/// 验证交易参考号格式 (`TXN-{数字}-{大写字母数字}`)
pub fn validate_reference(reference: &str) -> bool {
    let mut parts = reference.splitn(3, '-');
    let prefix = parts.next();
    let timestamp = parts.next();
    let suffix = parts.next();

    match (prefix, timestamp, suffix) {
        (Some("TXN"), Some(ts), Some(sfx)) => {
            !ts.is_empty()
                && ts.chars().all(|c| c.is_ascii_digit())
                && !sfx.is_empty()
                && sfx.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        }
        _ => false,
    }
}
