//! Running environment and platform filters

use serde::{Deserialize, Serialize};

/// Platform filter set carried by plugin and data entries.
///
/// Each filter is a comma separated list; an absent filter matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nl: Option<String>,
}

/// The environment features are installed into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub os: String,
    pub ws: String,
    pub arch: String,
    pub nl: String,
}

impl Environment {
    /// Detect the environment of the running process
    #[must_use]
    pub fn current() -> Self {
        let os = std::env::consts::OS.to_string();
        let ws = match os.as_str() {
            "macos" => "cocoa",
            "windows" => "win32",
            _ => "gtk",
        }
        .to_string();
        let nl = std::env::var("LANG")
            .ok()
            .and_then(|lang| lang.split('.').next().map(str::to_string))
            .filter(|lang| !lang.is_empty() && lang != "C" && lang != "POSIX")
            .unwrap_or_else(|| "en_US".to_string());
        Self {
            os,
            ws,
            arch: std::env::consts::ARCH.to_string(),
            nl,
        }
    }

    /// Override individual fields, keeping detected values for `None`
    #[must_use]
    pub fn with_overrides(
        mut self,
        os: Option<&str>,
        ws: Option<&str>,
        arch: Option<&str>,
        nl: Option<&str>,
    ) -> Self {
        if let Some(os) = os {
            self.os = os.to_string();
        }
        if let Some(ws) = ws {
            self.ws = ws.to_string();
        }
        if let Some(arch) = arch {
            self.arch = arch.to_string();
        }
        if let Some(nl) = nl {
            self.nl = nl.to_string();
        }
        self
    }

    /// Whether an entry with these filters applies here
    #[must_use]
    pub fn matches(&self, filters: &PlatformFilters) -> bool {
        list_matches(filters.os.as_deref(), |v| v == self.os)
            && list_matches(filters.ws.as_deref(), |v| v == self.ws)
            && list_matches(filters.arch.as_deref(), |v| v == self.arch)
            && list_matches(filters.nl.as_deref(), |v| {
                v == self.nl
                    || self
                        .nl
                        .strip_prefix(v)
                        .is_some_and(|rest| rest.starts_with('_'))
            })
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::current()
    }
}

fn list_matches(filter: Option<&str>, mut accept: impl FnMut(&str) -> bool) -> bool {
    match filter {
        None => true,
        Some(list) => {
            let mut values = list.split(',').map(str::trim).filter(|v| !v.is_empty()).peekable();
            values.peek().is_none() || values.any(|v| v == "*" || accept(v))
        }
    }
}
