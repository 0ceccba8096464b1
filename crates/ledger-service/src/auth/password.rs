//! 密码处理
//!
//! 提供加盐摘要与验证功能，账本只保存摘要与盐，不保存明文

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha512};

const SALT_LEN: usize = 16;

/// 密码摘要协作方
pub trait PasswordHasher: Send + Sync {
    /// 生成新的随机盐（已编码，可直接存储）
    fn generate_salt(&self) -> String;

    /// 计算 `password` 加盐后的摘要
    fn hash(&self, password: &str, salt: &str) -> String;

    /// 验证密码
    ///
    /// 比较明文密码加盐后的摘要与存储的摘要
    fn verify(&self, password: &str, salt: &str, expected: &str) -> bool {
        constant_time_eq(self.hash(password, salt).as_bytes(), expected.as_bytes())
    }
}

/// SHA-512(password || salt)，摘要与盐均以 base64 存储
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512PasswordHasher;

impl PasswordHasher for Sha512PasswordHasher {
    fn generate_salt(&self) -> String {
        STANDARD.encode(rand::random::<[u8; SALT_LEN]>())
    }

    fn hash(&self, password: &str, salt: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(password.as_bytes());
        hasher.update(salt.as_bytes());
        STANDARD.encode(hasher.finalize())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
