// SPDX-License-Identifier: GPL-3.0-only

use super::{CommandRunner, LocalProcess, Process};

/// Runs programs on another host through `ssh`
///
/// The remote shell re-parses the command line, so forwarded arguments are
/// quoted where needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRunner {
    ssh: String,
    target: String,
    compression: Option<String>,
}

impl RemoteRunner {
    /// `target` is the `[user@]host` part of a location.
    pub fn new(ssh: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            ssh: ssh.into(),
            target: target.into(),
            compression: None,
        }
    }

    /// Pass `-o Compression=<value>` to ssh.
    pub fn with_compression(mut self, compression: Option<String>) -> Self {
        self.compression = compression.filter(|value| !value.is_empty());
        self
    }

    fn argv(&self, program: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![self.ssh.clone()];

        if let Some(compression) = &self.compression {
            argv.push("-o".to_string());
            argv.push(format!("Compression={compression}"));
        }

        argv.push(self.target.clone());
        argv.push(quote(program));
        argv.extend(args.iter().map(|arg| quote(arg)));
        argv
    }
}

impl CommandRunner for RemoteRunner {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn Process> {
        Box::new(LocalProcess::new(self.argv(program, args)))
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '@' | ':' | '=' | '+' | ',' | '%')
}

/// Single-quote `arg` for a POSIX shell unless it is made of safe characters.
pub fn quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', r"'\''"))
}
