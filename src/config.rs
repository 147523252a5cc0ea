//! CLI configuration (SPEC_FULL.md §6). Manual `std::env::args()` parsing,
//! matching "Persistent state: None" and the absence of any on-disk config
//! format in the original — the teacher's `config`/`toml` dependencies are
//! dropped accordingly (see DESIGN.md).

use crate::error::SortError;

/// Which shuffle realization the sort driver should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleBackend {
    DirectPut,
    Conveyor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig {
    pub n: usize,
    pub print: bool,
    pub verify: bool,
    pub radix_bits: u32,
    pub shuffle_backend: ShuffleBackend,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            n: 100_000_000,
            print: false,
            verify: true,
            radix_bits: 16,
            shuffle_backend: ShuffleBackend::DirectPut,
        }
    }
}

impl SortConfig {
    /// Parses the flags in SPEC_FULL.md §6 out of an argument iterator
    /// (excluding argv[0]).
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, SortError> {
        let mut config = Self::default();
        let mut args = args.into_iter().peekable();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--n" => {
                    let value = args
                        .next()
                        .ok_or_else(|| SortError::Usage("--n requires a value".into()))?;
                    config.n = value
                        .parse()
                        .map_err(|_| SortError::Usage(format!("--n: not a valid integer: {value}")))?;
                }
                "--print" => config.print = true,
                "--verify" => config.verify = true,
                "--no-verify" => config.verify = false,
                "--radix-bits" => {
                    let value = args
                        .next()
                        .ok_or_else(|| SortError::Usage("--radix-bits requires a value".into()))?;
                    config.radix_bits = value
                        .parse()
                        .map_err(|_| SortError::Usage(format!("--radix-bits: not a valid integer: {value}")))?;
                    if 64 % config.radix_bits != 0 {
                        return Err(SortError::Usage(format!(
                            "--radix-bits must divide 64, got {}",
                            config.radix_bits
                        )));
                    }
                }
                "--conveyor" => config.shuffle_backend = ShuffleBackend::Conveyor,
                other => return Err(SortError::Usage(format!("unrecognized flag: {other}"))),
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_cli() {
        let config = SortConfig::parse(Vec::<String>::new()).unwrap();
        assert_eq!(config, SortConfig::default());
    }

    #[test]
    fn parses_every_documented_flag() {
        let args = vec![
            "--n".to_string(),
            "42".to_string(),
            "--print".to_string(),
            "--no-verify".to_string(),
            "--radix-bits".to_string(),
            "8".to_string(),
            "--conveyor".to_string(),
        ];
        let config = SortConfig::parse(args).unwrap();
        assert_eq!(config.n, 42);
        assert!(config.print);
        assert!(!config.verify);
        assert_eq!(config.radix_bits, 8);
        assert_eq!(config.shuffle_backend, ShuffleBackend::Conveyor);
    }

    #[test]
    fn rejects_unrecognized_flags() {
        assert!(SortConfig::parse(vec!["--bogus".to_string()]).is_err());
    }

    #[test]
    fn rejects_radix_bits_not_dividing_64() {
        let args = vec!["--radix-bits".to_string(), "7".to_string()];
        assert!(SortConfig::parse(args).is_err());
    }
}
