//! Conflict naming for preserved local copies
//!
//! Generates the file name under which the losing local copy is kept,
//! following the pattern `<stem> (<user>-version)<ext>`. When that name is
//! taken, an index is appended inside the parentheses:
//! `<stem> (<user>-version 2)<ext>`, `<stem> (<user>-version 3)<ext>`, ...

/// Placeholder replaced by the user identity in the suffix template
pub const USER_PLACEHOLDER: &str = "{user}";

/// Default suffix template
pub const DEFAULT_SUFFIX: &str = "{user}-version";

/// Generates conflict copy file names
#[derive(Debug, Clone)]
pub struct ConflictNamer {
    template: String,
}

impl ConflictNamer {
    /// Creates a namer from a suffix template containing `{user}`
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Candidate name number `index` (1-based) for `original_name`
    ///
    /// Given "report.docx", user "alice" and index 1, produces
    /// "report (alice-version).docx"; index 2 gives "report (alice-version 2).docx".
    pub fn candidate(&self, original_name: &str, user: &str, index: u32) -> String {
        let mut suffix = self.template.replace(USER_PLACEHOLDER, user);
        if index > 1 {
            suffix.push_str(&format!(" {index}"));
        }

        match split_extension(original_name) {
            (stem, Some(ext)) => format!("{stem} ({suffix}){ext}"),
            (stem, None) => format!("{stem} ({suffix})"),
        }
    }

    /// Returns true if `name` looks like a conflict copy made by any user
    pub fn is_conflict_copy(&self, name: &str) -> bool {
        let (prefix, postfix) = match self.template.split_once(USER_PLACEHOLDER) {
            Some(parts) => parts,
            None => (self.template.as_str(), ""),
        };

        // Without an extension the whole name is the stem; a user name with a
        // dot would otherwise be mistaken for one.
        let stems = [Some(name), Some(split_extension(name).0)];
        stems.into_iter().flatten().any(|stem| {
            let Some(inner) = stem
                .strip_suffix(')')
                .and_then(|s| s.rsplit_once(" ("))
                .map(|(_, inner)| inner)
            else {
                return false;
            };
            let Some(rest) = inner.strip_prefix(prefix) else {
                return false;
            };
            if rest.ends_with(postfix) && rest.len() > postfix.len() {
                return true;
            }
            match rest.rsplit_once(' ') {
                Some((head, index)) => {
                    head.ends_with(postfix)
                        && head.len() > postfix.len()
                        && !index.is_empty()
                        && index.chars().all(|c| c.is_ascii_digit())
                }
                None => false,
            }
        })
    }
}

impl Default for ConflictNamer {
    fn default() -> Self {
        Self::new(DEFAULT_SUFFIX)
    }
}

/// Splits at the last dot, keeping dot-files ("`.bashrc`") whole
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], Some(&name[pos..])),
        _ => (name, None),
    }
}
