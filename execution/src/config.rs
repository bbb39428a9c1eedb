/// Absolute and relative tolerance for parity checks: `|a - r| <= atol + rtol * |r|`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub atol: f64,
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { atol: 1e-5, rtol: 1e-5 }
    }
}

/// How the engine treats accelerated bindings, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    /// Prefer an accelerated binding when one is registered
    pub accelerate: bool,
    /// Check accelerated results against the reference binding
    pub verify: Option<Tolerance>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { accelerate: true, verify: None }
    }
}

impl DispatchConfig {
    /// Reference bindings only
    pub fn reference_only() -> Self {
        Self { accelerate: false, verify: None }
    }

    /// Accelerated bindings, each call verified against the reference
    pub fn verified(tolerance: Tolerance) -> Self {
        Self { accelerate: true, verify: Some(tolerance) }
    }

    /// Read the configuration from the environment.
    ///
    /// - `OPATTR_ACCELERATE`: `0`, `false` or `off` disables accelerated bindings
    /// - `OPATTR_VERIFY`: `1`, `true` or `on` enables parity verification
    /// - `OPATTR_VERIFY_ATOL`, `OPATTR_VERIFY_RTOL`: tolerance overrides
    ///
    /// Unrecognised values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| {
            lookup(key).and_then(|v| match v.trim().to_lowercase().as_str() {
                "1" | "true" | "on" => Some(true),
                "0" | "false" | "off" => Some(false),
                _ => None,
            })
        };
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok()).filter(|v| *v >= 0.0);

        let mut config = Self::default();
        if let Some(accelerate) = flag("OPATTR_ACCELERATE") {
            config.accelerate = accelerate;
        }
        if flag("OPATTR_VERIFY") == Some(true) {
            let mut tol = Tolerance::default();
            if let Some(atol) = number("OPATTR_VERIFY_ATOL") {
                tol.atol = atol;
            }
            if let Some(rtol) = number("OPATTR_VERIFY_RTOL") {
                tol.rtol = rtol;
            }
            config.verify = Some(tol);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> DispatchConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        DispatchConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_accelerate_without_verification() {
        assert_eq!(from(&[]), DispatchConfig::default());
        assert_eq!(from(&[("OPATTR_ACCELERATE", "maybe")]), DispatchConfig::default());
    }

    #[test]
    fn reads_flags_and_tolerances() {
        assert!(!from(&[("OPATTR_ACCELERATE", "Off")]).accelerate);

        let config = from(&[("OPATTR_VERIFY", "1"), ("OPATTR_VERIFY_ATOL", "1e-3"), ("OPATTR_VERIFY_RTOL", "-2")]);
        assert_eq!(config.verify, Some(Tolerance { atol: 1e-3, rtol: 1e-5 }));

        assert_eq!(from(&[("OPATTR_VERIFY_ATOL", "1e-3")]).verify, None);
    }
}
