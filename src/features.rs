use std::fmt;
use std::str::FromStr;

/// Optional machine behaviour, enabled with a comma-separated list such as `trace,stack-guard`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Print a trace line to stderr before every instruction.
    trace: bool,
    /// Keep the stack between the end of the loaded program and its initial pointer.
    stack_guard: bool,
}

impl Features {
    pub fn trace(&self) -> bool {
        self.trace
    }

    pub fn stack_guard(&self) -> bool {
        self.stack_guard
    }

    pub fn with_trace(mut self, value: bool) -> Self {
        self.trace = value;
        self
    }

    pub fn with_stack_guard(mut self, value: bool) -> Self {
        self.stack_guard = value;
        self
    }
}

impl FromStr for Features {
    type Err = String;
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let mut features = Self::default();
        for word in string.split(',') {
            let value = match word.trim() {
                "" => continue,
                "trace" => &mut features.trace,
                "stack-guard" => &mut features.stack_guard,
                _ => return Err(format!("Unknown feature '{}'", word)),
            };
            if *value {
                return Err(format!("Cannot specify feature '{}' twice", word));
            }
            *value = true;
        }
        Ok(features)
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let features = [("trace", self.trace), ("stack-guard", self.stack_guard)];
        let mut has_any_feature = false;
        for (name, value) in features {
            if !value {
                continue;
            }
            if has_any_feature {
                write!(f, ",")?;
            }
            write!(f, "{}", name)?;
            has_any_feature = true;
        }
        Ok(())
    }
}
