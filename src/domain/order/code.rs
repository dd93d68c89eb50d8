//! Order code generation.
//!
//! Codes are 10 uppercase alphanumeric characters. Uniqueness is checked
//! against storage by the repository; the generator only proposes.

use rand::Rng;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Length of a generated order code.
pub const ORDER_CODE_LENGTH: usize = 10;

/// Attempts before code generation gives up.
pub const MAX_CODE_ATTEMPTS: usize = 10;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Proposes candidate order codes.
pub trait OrderCodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Thread-local RNG backed generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl OrderCodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..ORDER_CODE_LENGTH)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect()
    }
}

/// Replays a fixed list of codes, then falls back to random ones.
///
/// Used to force collisions deterministically.
#[derive(Debug, Default)]
pub struct SequenceCodeGenerator {
    codes: Mutex<VecDeque<String>>,
}

impl SequenceCodeGenerator {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: Mutex::new(codes.into_iter().map(Into::into).collect()),
        }
    }
}

impl OrderCodeGenerator for SequenceCodeGenerator {
    fn generate(&self) -> String {
        let next = match self.codes.lock() {
            Ok(mut codes) => codes.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| RandomCodeGenerator.generate())
    }
}

/// Returns true if `code` has the generated shape.
pub fn is_valid_order_code(code: &str) -> bool {
    code.len() == ORDER_CODE_LENGTH && code.bytes().all(|b| CODE_CHARSET.contains(&b))
}
