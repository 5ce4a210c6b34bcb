//! Conflict handling for refreshing a working copy against the root.
//!
//! [`RefreshOptions`] pairs three independent "fail on conflict" switches with
//! exactly one [`UpdateMode`]. The raw, flag-per-field form used by callers
//! that assemble options from loose booleans is [`RefreshFlags`]; it is only
//! valid when exactly one of the three mode flags is set.

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// What to do with a locally modified value the root still holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Replace the local value with `merge(root, local)`.
    #[default]
    Merge,
    /// Replace the local value with the root's value.
    Replace,
    /// Keep the local value as is.
    Ignore,
}

/// Validated conflict-handling options for a working copy update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefreshOptions {
    fail_on_add_conflict: bool,
    fail_on_modify_conflict: bool,
    fail_on_remove_conflict: bool,
    mode: UpdateMode,
}

impl RefreshOptions {
    /// Fail on every kind of conflict; merge otherwise.
    ///
    /// This mirrors the default behaviour of Subversion.
    pub const STRICT: Self = Self {
        fail_on_add_conflict: true,
        fail_on_modify_conflict: true,
        fail_on_remove_conflict: true,
        mode: UpdateMode::Merge,
    };

    /// Options that never fail and resolve modifications with `mode`.
    pub const fn new(mode: UpdateMode) -> Self {
        Self {
            fail_on_add_conflict: false,
            fail_on_modify_conflict: false,
            fail_on_remove_conflict: false,
            mode,
        }
    }

    pub const fn fail_on_add(mut self, fail: bool) -> Self {
        self.fail_on_add_conflict = fail;
        self
    }

    pub const fn fail_on_modify(mut self, fail: bool) -> Self {
        self.fail_on_modify_conflict = fail;
        self
    }

    pub const fn fail_on_remove(mut self, fail: bool) -> Self {
        self.fail_on_remove_conflict = fail;
        self
    }

    /// Fail when the root changed a key the working copy added.
    pub fn fail_on_add_conflict(&self) -> bool {
        self.fail_on_add_conflict
    }

    /// Fail when the root changed a key the working copy modified or read.
    pub fn fail_on_modify_conflict(&self) -> bool {
        self.fail_on_modify_conflict
    }

    /// Fail when the root changed a key the working copy removed.
    pub fn fail_on_remove_conflict(&self) -> bool {
        self.fail_on_remove_conflict
    }

    pub fn mode(&self) -> UpdateMode {
        self.mode
    }
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self::STRICT
    }
}

/// Unvalidated, one-boolean-per-option form of [`RefreshOptions`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshFlags {
    pub fail_on_add_conflict: bool,
    pub fail_on_modify_conflict: bool,
    pub fail_on_remove_conflict: bool,
    pub merge_on_update: bool,
    pub replace_on_update: bool,
    pub ignore_on_update: bool,
}

impl RefreshFlags {
    /// Returns `true` if exactly one update mode flag is set.
    pub fn is_valid(&self) -> bool {
        [
            self.merge_on_update,
            self.replace_on_update,
            self.ignore_on_update,
        ]
        .iter()
        .filter(|set| **set)
        .count()
            == 1
    }
}

impl TryFrom<RefreshFlags> for RefreshOptions {
    type Error = TypeError;

    fn try_from(flags: RefreshFlags) -> Result<Self, Self::Error> {
        if !flags.is_valid() {
            return Err(TypeError::InvalidRefreshOptions(
                "exactly one of merge_on_update, replace_on_update or ignore_on_update must be set"
                    .to_string(),
            ));
        }
        let mode = if flags.merge_on_update {
            UpdateMode::Merge
        } else if flags.replace_on_update {
            UpdateMode::Replace
        } else {
            UpdateMode::Ignore
        };
        Ok(RefreshOptions::new(mode)
            .fail_on_add(flags.fail_on_add_conflict)
            .fail_on_modify(flags.fail_on_modify_conflict)
            .fail_on_remove(flags.fail_on_remove_conflict))
    }
}

impl From<RefreshOptions> for RefreshFlags {
    fn from(options: RefreshOptions) -> Self {
        Self {
            fail_on_add_conflict: options.fail_on_add_conflict,
            fail_on_modify_conflict: options.fail_on_modify_conflict,
            fail_on_remove_conflict: options.fail_on_remove_conflict,
            merge_on_update: options.mode == UpdateMode::Merge,
            replace_on_update: options.mode == UpdateMode::Replace,
            ignore_on_update: options.mode == UpdateMode::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_fails_on_everything_and_merges() {
        let strict = RefreshOptions::STRICT;
        assert!(strict.fail_on_add_conflict());
        assert!(strict.fail_on_modify_conflict());
        assert!(strict.fail_on_remove_conflict());
        assert_eq!(strict.mode(), UpdateMode::Merge);
        assert_eq!(RefreshOptions::default(), strict);
    }

    #[test]
    fn builder_sets_individual_flags() {
        let options = RefreshOptions::new(UpdateMode::Replace).fail_on_remove(true);
        assert!(!options.fail_on_add_conflict());
        assert!(!options.fail_on_modify_conflict());
        assert!(options.fail_on_remove_conflict());
        assert_eq!(options.mode(), UpdateMode::Replace);
    }

    #[test]
    fn flags_require_exactly_one_mode() {
        let none = RefreshFlags::default();
        assert!(!none.is_valid());
        assert!(RefreshOptions::try_from(none).is_err());

        let two = RefreshFlags {
            merge_on_update: true,
            ignore_on_update: true,
            ..Default::default()
        };
        assert!(!two.is_valid());

        let one = RefreshFlags {
            ignore_on_update: true,
            fail_on_add_conflict: true,
            ..Default::default()
        };
        assert!(one.is_valid());
        let options = RefreshOptions::try_from(one).unwrap();
        assert_eq!(options.mode(), UpdateMode::Ignore);
        assert!(options.fail_on_add_conflict());
    }

    #[test]
    fn flags_roundtrip_through_options() {
        let flags = RefreshFlags::from(RefreshOptions::STRICT);
        assert!(flags.is_valid());
        assert!(flags.merge_on_update);
        assert_eq!(RefreshOptions::try_from(flags).unwrap(), RefreshOptions::STRICT);
    }

    #[test]
    fn flags_deserialize_with_defaults() {
        let flags: RefreshFlags = serde_json::from_str(r#"{"replace_on_update": true}"#).unwrap();
        assert!(flags.is_valid());
        assert!(!flags.fail_on_modify_conflict);
    }
}
