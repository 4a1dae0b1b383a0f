//! Collision-free output paths for decoded classes.
//!
//! Each class gets a `.java` and a `.smali` twin. When either twin would
//! land on an existing file, or on a path already handed out in this run,
//! both move to the next free `~N` suffix together.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::decompiler::ClassEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPathAssignment {
    pub java: PathBuf,
    pub smali: PathBuf,
}

#[derive(Debug)]
pub struct OutputPathResolver {
    root: PathBuf,
    flatten: bool,
    assigned: Mutex<HashSet<PathBuf>>,
}

impl OutputPathResolver {
    pub fn new(root: impl Into<PathBuf>, flatten: bool) -> Self {
        Self {
            root: root.into(),
            flatten,
            assigned: Mutex::new(HashSet::new()),
        }
    }

    /// Reserves the first `base`, `base~2`, `base~3`, ... where both twins
    /// are free. Safe to call from several workers at once.
    pub fn resolve(&self, class: &ClassEntry) -> OutputPathAssignment {
        let base = if self.flatten {
            class.simple_name.as_str()
        } else {
            class.alias_path.as_str()
        };

        let mut assigned = self
            .assigned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut index = 1usize;
        loop {
            let candidate = self.candidate(base, index);
            if is_free(&candidate.java, &assigned) && is_free(&candidate.smali, &assigned) {
                assigned.insert(candidate.java.clone());
                assigned.insert(candidate.smali.clone());
                return candidate;
            }
            index += 1;
        }
    }

    fn candidate(&self, base: &str, index: usize) -> OutputPathAssignment {
        let stem = if index == 1 {
            base.to_string()
        } else {
            format!("{base}~{index}")
        };
        if self.flatten {
            OutputPathAssignment {
                java: self.root.join(format!("{stem}.java")),
                smali: self.root.join(format!("{stem}.smali")),
            }
        } else {
            OutputPathAssignment {
                java: self.root.join("java").join(format!("{stem}.java")),
                smali: self.root.join("smali").join(format!("{stem}.smali")),
            }
        }
    }
}

fn is_free(path: &Path, assigned: &HashSet<PathBuf>) -> bool {
    !assigned.contains(path) && !path.exists()
}
