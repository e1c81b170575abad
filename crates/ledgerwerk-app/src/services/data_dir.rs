// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::PathBuf;

/// Resolve the data directory: explicit override (`--data-dir` or
/// `LEDGERWERK_DATA_DIR`), then `$XDG_DATA_HOME/ledgerwerk`, then
/// `$HOME/.local/share/ledgerwerk`.
pub fn data_dir(explicit: Option<PathBuf>) -> PathBuf {
    resolve(
        explicit,
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
    )
}

fn resolve(explicit: Option<PathBuf>, xdg: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    let base = match (xdg, home) {
        (Some(xdg), _) if !xdg.is_empty() => PathBuf::from(xdg),
        (_, Some(home)) => PathBuf::from(home).join(".local").join("share"),
        // Last resort
        _ => PathBuf::from("/tmp"),
    };
    base.join("ledgerwerk")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let dir = resolve(Some("/srv/ledger".into()), Some("/x".into()), Some("/h".into()));
        assert_eq!(dir, PathBuf::from("/srv/ledger"));
    }

    #[test]
    fn xdg_before_home() {
        assert_eq!(
            resolve(None, Some("/xdg".into()), Some("/home/u".into())),
            PathBuf::from("/xdg/ledgerwerk")
        );
        assert_eq!(
            resolve(None, Some(String::new()), Some("/home/u".into())),
            PathBuf::from("/home/u/.local/share/ledgerwerk")
        );
    }

    #[test]
    fn falls_back_to_tmp() {
        assert_eq!(resolve(None, None, None), PathBuf::from("/tmp/ledgerwerk"));
    }
}
