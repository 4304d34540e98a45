//! Argument templating for external tools

use std::process::Stdio;

use tokio::process::Command;

const CHANNEL_PLACEHOLDER: &str = "{channel}";
const URL_PLACEHOLDER: &str = "{url}";

/// A program plus an argument template
///
/// Any argument may contain `{channel}` (the bare channel name) or `{url}`
/// (the channel page URL built from `url_template`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    url_template: String,
}

impl ToolCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            url_template: CHANNEL_PLACEHOLDER.to_string(),
        }
    }

    /// Set the template used to expand `{url}`
    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The channel page URL
    pub fn channel_url(&self, channel: &str) -> String {
        self.url_template.replace(CHANNEL_PLACEHOLDER, channel)
    }

    /// Arguments with placeholders expanded for `channel`
    pub fn render_args(&self, channel: &str) -> Vec<String> {
        let url = self.channel_url(channel);
        self.args
            .iter()
            .map(|arg| {
                arg.replace(URL_PLACEHOLDER, &url)
                    .replace(CHANNEL_PLACEHOLDER, channel)
            })
            .collect()
    }

    /// A ready-to-spawn command with stdin and stderr detached
    pub fn command(&self, channel: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.render_args(channel))
            .stdin(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}
