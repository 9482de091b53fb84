// 公证服务在线支付模块
// 负责支付交易的生命周期管理与服务商回调对账

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
