// 中间件模块
// 包含请求日志与跨域配置

pub mod cors;
pub mod logging;

// 重新导出中间件
pub use cors::*;
pub use logging::*;
