use super::error::AppError;
use clap::Parser;
use clap::error::ErrorKind;
use std::ffi::OsString;
use std::fmt;

/// Consumer group id, read once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupName(String);

impl GroupName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for GroupName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("group name must not be empty".into());
        }
        Ok(GroupName(s.to_owned()))
    }
}

#[derive(clap::Parser, Debug)]
#[command(version, about = "Print every message of the rider-updates topic for a consumer group")]
pub struct Args {
    /// consumer group name
    #[arg(value_name = "GROUP")]
    pub group: GroupName,
}

impl Args {
    /// Help and version requests print and exit here; every other parse
    /// failure becomes a configuration error.
    pub fn parse_args<I, T>(iter: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(iter) {
            Ok(args) => Ok(args),
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                e.exit()
            }
            Err(e) => Err(AppError::Config(e.to_string())),
        }
    }
}
