//! 认证模块
//!
//! 提供密码加盐摘要与验证功能

mod password;

pub use password::{PasswordHasher, Sha512PasswordHasher};
