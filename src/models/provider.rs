// 支付服务商模型
// 定义支持的支付服务商以及旧版名称到服务商的路由表

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 支付服务商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// YengaPay 聚合支付 (Orange Money / Moov Money)
    Yengapay,
}

/// 外部名称到服务商的路由表
///
/// `orange_money` 与 `moov_money` 是旧版客户端使用的名称，统一路由到 YengaPay。
const PROVIDER_ALIASES: &[(&str, Provider)] = &[
    ("yengapay", Provider::Yengapay),
    ("orange_money", Provider::Yengapay),
    ("moov_money", Provider::Yengapay),
];

impl Provider {
    /// 默认服务商 (旧版单一Webhook地址使用)
    pub const DEFAULT: Provider = Provider::Yengapay;

    /// 根据外部名称解析服务商，大小写不敏感
    pub fn resolve(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        PROVIDER_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, provider)| *provider)
    }

    /// 持久化使用的标识
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Yengapay => "yengapay",
        }
    }

    /// 展示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Yengapay => "YengaPay",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::resolve(s).ok_or_else(|| format!("unsupported payment provider: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_names_route_to_yengapay() {
        assert_eq!(Provider::resolve("yengapay"), Some(Provider::Yengapay));
        assert_eq!(Provider::resolve("orange_money"), Some(Provider::Yengapay));
        assert_eq!(Provider::resolve(" Moov_Money "), Some(Provider::Yengapay));
    }

    #[test]
    fn test_unknown_provider() {
        assert_eq!(Provider::resolve("paypal"), None);
        assert_eq!(Provider::resolve(""), None);
        assert!("wave".parse::<Provider>().is_err());
    }

    #[test]
    fn test_serialized_name_matches_storage_name() {
        let provider = Provider::Yengapay;
        assert_eq!(serde_json::to_string(&provider).unwrap(), "\"yengapay\"");
        assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
    }
}
