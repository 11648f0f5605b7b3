use wmem_block::DEFAULT_BLOCK_SIZE;

pub const USAGE: &str = "\
usage: wmem-stress [--ops N] [--seed N] [--max-size N] [--block-size N] [--verify]

  --ops N         operations to run (default 100000)
  --seed N        workload seed (default 1)
  --max-size N    largest request in bytes (default 65536)
  --block-size N  standard block size in bytes (default 8388608)
  --verify        check allocator invariants after every operation

Log level is read from WMEM_LOG (error, warn, info, debug, trace).";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub ops: u64,
    pub seed: u64,
    pub max_size: usize,
    pub block_size: usize,
    pub verify: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            ops: 100_000,
            seed: 1,
            max_size: 65_536,
            block_size: DEFAULT_BLOCK_SIZE,
            verify: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArgsError {
    #[error("unknown argument `{0}`")]
    Unknown(String),
    #[error("`{0}` needs a value")]
    MissingValue(&'static str),
    #[error("`{flag}` expects a number, got `{value}`")]
    NotANumber { flag: &'static str, value: String },
}

impl Args {
    /// Parse command-line arguments (without the program name).
    ///
    /// Returns `Ok(None)` when help was requested.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--verify" => parsed.verify = true,
                "--ops" => parsed.ops = number(&mut args, "--ops")?,
                "--seed" => parsed.seed = number(&mut args, "--seed")?,
                "--max-size" => parsed.max_size = number(&mut args, "--max-size")?,
                "--block-size" => parsed.block_size = number(&mut args, "--block-size")?,
                _ => return Err(ArgsError::Unknown(arg)),
            }
        }

        Ok(Some(parsed))
    }
}

fn number<T: std::str::FromStr>(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<T, ArgsError> {
    let value = args.next().ok_or(ArgsError::MissingValue(flag))?;
    value
        .replace('_', "")
        .parse()
        .map_err(|_| ArgsError::NotANumber { flag, value })
}
