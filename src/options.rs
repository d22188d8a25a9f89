//! Command-line option assembly for Composer invocations.

/// Insertion-ordered set of `--flag` / `--key=value` options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    options: Vec<(String, Option<String>)>,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bare `--name` flag.
    pub fn flag(mut self, name: &str) -> Self {
        self.options.push((normalize(name), None));
        self
    }

    /// Add a `--name=value` option. The value is trimmed.
    pub fn value(mut self, name: &str, value: &str) -> Self {
        self.options
            .push((normalize(name), Some(value.trim().to_string())));
        self
    }

    /// Whether an option was set, with or without leading dashes.
    pub fn contains(&self, name: &str) -> bool {
        let name = normalize(name);
        self.options.iter().any(|(existing, _)| *existing == name)
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Serialize to argv form, in insertion order.
    pub fn to_args(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|(name, value)| match value {
                None => format!("--{name}"),
                Some(value) => format!("--{name}={value}"),
            })
            .collect()
    }
}

fn normalize(name: &str) -> String {
    name.trim_start_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_and_values_serialize_in_order() {
        let options = CommandOptions::new()
            .flag("prefer-dist")
            .value("format", "json")
            .flag("no-plugins");

        assert_eq!(
            options.to_args(),
            ["--prefer-dist", "--format=json", "--no-plugins"]
        );
    }

    #[test]
    fn test_leading_dashes_are_normalized() {
        let options = CommandOptions::new().flag("--prefer-dist");

        assert_eq!(options.to_args(), ["--prefer-dist"]);
        assert!(options.contains("prefer-dist"));
        assert!(options.contains("--prefer-dist"));
    }

    #[test]
    fn test_values_are_trimmed() {
        let options = CommandOptions::new().value("working-dir", " /srv/app ");
        assert_eq!(options.to_args(), ["--working-dir=/srv/app"]);
    }

    #[test]
    fn test_empty_options() {
        let options = CommandOptions::new();
        assert!(options.is_empty());
        assert!(options.to_args().is_empty());
        assert!(!options.contains("prefer-dist"));
    }
}
