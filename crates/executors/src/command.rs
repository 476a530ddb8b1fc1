//! Shell command assembly for agent CLIs.

use serde::{Deserialize, Serialize};

/// User-supplied tweaks to an agent's base invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmdOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_command_override: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_params: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    base: String,
    params: Vec<String>,
}

impl CommandBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn extend_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn override_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Assemble the full shell string. Params carrying whitespace or shell
    /// metacharacters are quoted; the base command is taken verbatim so
    /// multi-word bases ("npx -y …") keep working.
    pub fn build_initial(&self) -> String {
        let mut command = self.base.clone();
        for param in &self.params {
            command.push(' ');
            match shlex::try_quote(param) {
                Ok(quoted) => command.push_str(&quoted),
                Err(_) => command.push_str(param),
            }
        }
        command
    }
}

pub fn apply_overrides(mut builder: CommandBuilder, overrides: &CmdOverrides) -> CommandBuilder {
    if let Some(base) = &overrides.base_command_override {
        builder = builder.override_base(base.clone());
    }
    if !overrides.additional_params.is_empty() {
        builder = builder.extend_params(overrides.additional_params.iter().cloned());
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_quotes_params_with_spaces() {
        let cmd = CommandBuilder::new("agent exec")
            .params(["--flag"])
            .extend_params(["--model", "claude sonnet"])
            .build_initial();
        assert_eq!(cmd, "agent exec --flag --model 'claude sonnet'");
    }

    #[test]
    fn test_overrides_replace_base_and_append() {
        let builder = CommandBuilder::new("agent").params(["-p"]);
        let overrides = CmdOverrides {
            base_command_override: Some("/usr/local/bin/agent".to_string()),
            additional_params: vec!["--verbose".to_string()],
        };
        let cmd = apply_overrides(builder, &overrides).build_initial();
        assert_eq!(cmd, "/usr/local/bin/agent -p --verbose");
    }
}
