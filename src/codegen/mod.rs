use std::collections::HashSet;
use std::sync::Mutex;

use rand::Rng;
use sha2::{Digest, Sha256};

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn pick(charset: &[u8], rng: &mut impl Rng) -> char {
    charset[rng.gen_range(0..charset.len())] as char
}

fn random_chunk(charset: &[u8], len: usize, rng: &mut impl Rng) -> String {
    (0..len).map(|_| pick(charset, rng)).collect()
}

/// Closed list of plausible activation-code surface formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeFormat {
    DashedGroups,
    Alnum16,
    Alnum12,
    Alnum20,
    AppPrefixed,
    ProPrefixed,
    Timestamped,
    LettersDigits,
    DigestPrefix,
}

impl CodeFormat {
    pub const ALL: [CodeFormat; 9] = [
        CodeFormat::DashedGroups,
        CodeFormat::Alnum16,
        CodeFormat::Alnum12,
        CodeFormat::Alnum20,
        CodeFormat::AppPrefixed,
        CodeFormat::ProPrefixed,
        CodeFormat::Timestamped,
        CodeFormat::LettersDigits,
        CodeFormat::DigestPrefix,
    ];

    fn render(self, rng: &mut impl Rng) -> String {
        match self {
            CodeFormat::DashedGroups => (0..4)
                .map(|_| random_chunk(ALNUM, 4, rng))
                .collect::<Vec<_>>()
                .join("-"),
            CodeFormat::Alnum16 => random_chunk(ALNUM, 16, rng),
            CodeFormat::Alnum12 => random_chunk(ALNUM, 12, rng),
            CodeFormat::Alnum20 => random_chunk(ALNUM, 20, rng),
            CodeFormat::AppPrefixed => format!("APP-{}", random_chunk(ALNUM, 12, rng)),
            CodeFormat::ProPrefixed => format!("PRO-{}", random_chunk(ALNUM, 12, rng)),
            CodeFormat::Timestamped => format!(
                "T{}-{}",
                chrono::Utc::now().timestamp(),
                random_chunk(ALNUM, 8, rng)
            ),
            CodeFormat::LettersDigits => format!(
                "{}-{}",
                random_chunk(UPPER, 4, rng),
                random_chunk(DIGITS, 6, rng)
            ),
            CodeFormat::DigestPrefix => {
                let mut hasher = Sha256::new();
                hasher.update(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string());
                hasher.update(rng.gen::<u64>().to_le_bytes());
                hex::encode(hasher.finalize())[..16].to_uppercase()
            }
        }
    }
}

/// Expands a code pattern by character class: `X` draws an uppercase letter,
/// `N` a digit, `A` an alphanumeric; anything else passes through literally.
pub fn expand_pattern(pattern: &str) -> String {
    let mut rng = rand::thread_rng();
    pattern
        .chars()
        .map(|c| match c {
            'X' => pick(UPPER, &mut rng),
            'N' => pick(DIGITS, &mut rng),
            'A' => pick(ALNUM, &mut rng),
            other => other,
        })
        .collect()
}

/// Draws candidate codes, guaranteeing uniqueness within the run. Safe to
/// share between workers.
#[derive(Debug, Default)]
pub struct CodeGenerator {
    seen: Mutex<HashSet<String>>,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn seen(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Picks a format uniformly at random and regenerates until the result
    /// has not been emitted this run.
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let format = CodeFormat::ALL[rng.gen_range(0..CodeFormat::ALL.len())];
            let code = format.render(&mut rng);
            if self.seen().insert(code.clone()) {
                return code;
            }
        }
    }

    /// Pattern-driven draw, tracked against the same uniqueness set.
    pub fn generate_from_pattern(&self, pattern: &str) -> String {
        loop {
            let code = expand_pattern(pattern);
            if self.seen().insert(code.clone()) {
                return code;
            }
        }
    }

    pub fn emitted(&self) -> usize {
        self.seen().len()
    }
}
