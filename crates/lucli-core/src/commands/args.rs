//! Minimal argv parsing shared by every command body (§4.8).
//!
//! The facade accepts raw argv from the CLI, the interactive front end,
//! and the daemon alike, so parsing lives here rather than behind a
//! process-exiting parser crate: a positional lookup plus `--flag` /
//! `--flag value` / `--flag=value` extraction is all any command needs.

pub struct Args<'a> {
    argv: &'a [String],
}

impl<'a> Args<'a> {
    pub fn new(argv: &'a [String]) -> Self {
        Self { argv }
    }

    /// The `index`-th token that isn't itself a `--flag`.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.argv
            .iter()
            .enumerate()
            .filter(|(i, a)| !a.starts_with("--") && !self.is_flag_value(*i))
            .nth(index)
            .map(|(_, a)| a.as_str())
    }

    /// Whether token `i` is the value half of a preceding `--flag value` pair.
    fn is_flag_value(&self, i: usize) -> bool {
        i > 0 && self.argv[i - 1].starts_with("--") && !self.argv[i - 1].contains('=')
    }

    pub fn flag(&self, name: &str) -> bool {
        let bare = format!("--{name}");
        self.argv.iter().any(|a| a == &bare)
    }

    pub fn value(&self, name: &str) -> Option<String> {
        let eq_prefix = format!("--{name}=");
        let bare = format!("--{name}");
        for (i, a) in self.argv.iter().enumerate() {
            if let Some(v) = a.strip_prefix(eq_prefix.as_str()) {
                return Some(v.to_string());
            }
            if *a == bare {
                return self.argv.get(i + 1).cloned();
            }
        }
        None
    }
}
