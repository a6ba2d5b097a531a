//! Train/val/test split assignment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which dataset partition an image belongs to. Newly imported images start
/// out `Unassigned` until a split policy runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Val,
    Test,
    #[default]
    Unassigned,
}

impl Split {
    /// Directory name used in exported dataset layouts; `None` for
    /// unassigned images, which land in the un-split root directories.
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            Split::Train => Some("train"),
            Split::Val => Some("val"),
            Split::Test => Some("test"),
            Split::Unassigned => None,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
            Split::Unassigned => "unassigned",
        };
        f.write_str(name)
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            "unassigned" => Ok(Split::Unassigned),
            other => Err(format!("unknown split '{other}'")),
        }
    }
}
