use crate::traits::{ChatMessage, ToolSpec};
use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_PLAN_PROMPT: &str = "For the given objective, come up with a simple step by step plan.
This plan should involve individual tasks that, if executed correctly, will yield the correct answer. Do not add any superfluous steps.
The result of the final step should be the final answer. Make sure that each step has all the information needed - do not skip steps.
Answer by calling the plan tool exactly once.

Objective: {objective}";

pub const DEFAULT_EXECUTE_PROMPT: &str = "You are a research assistant working through one step of a larger plan.
Use the search and scrape tools to gather facts from the web. Results of earlier steps are not repeated here; call the query tool with a step name to read one.

Steps completed so far:
{past_steps}

Your task: {step}

When you are done, answer with the result of this step in plain text.";

pub const DEFAULT_REPLAN_PROMPT: &str = "For the given objective, come up with a simple step by step plan.
This plan should involve individual tasks that, if executed correctly, will yield the correct answer. Do not add any superfluous steps.
The result of the final step should be the final answer. Make sure that each step has all the information needed - do not skip steps.

Your objective was this:
{objective}

Your original plan was this:
{plan}

You have currently done the following steps:
{past_steps}

Update your plan accordingly. If no more steps are needed and you can return to the user, call the response tool with the answer.
Otherwise, call the plan tool with only the steps that still need to be done. Do not return previously done steps as part of the plan.
Call exactly one of the two tools.";

/// Which node a prompt is for. Each has a file in the workspace that
/// overrides the built-in template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Plan,
    Execute,
    Replan,
}

impl PromptKind {
    pub const ALL: [PromptKind; 3] = [PromptKind::Plan, PromptKind::Execute, PromptKind::Replan];

    pub fn file_name(self) -> &'static str {
        match self {
            PromptKind::Plan => "PLAN.md",
            PromptKind::Execute => "EXECUTE.md",
            PromptKind::Replan => "REPLAN.md",
        }
    }

    pub fn default_template(self) -> &'static str {
        match self {
            PromptKind::Plan => DEFAULT_PLAN_PROMPT,
            PromptKind::Execute => DEFAULT_EXECUTE_PROMPT,
            PromptKind::Replan => DEFAULT_REPLAN_PROMPT,
        }
    }
}

/// Values substituted into a prompt template.
#[derive(Debug, Clone, Default)]
pub struct PromptVars<'a> {
    pub objective: &'a str,
    pub step: &'a str,
    pub plan: &'a str,
    pub past_steps: &'a str,
}

impl PromptVars<'_> {
    /// Substitutes placeholders in one left-to-right pass; inserted values
    /// are never scanned again. Unknown `{...}` text is kept as is.
    fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let value = tail
                .find('}')
                .and_then(|close| self.lookup(&tail[1..close]).map(|v| (v, close)));
            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "objective" => Some(self.objective),
            "step" => Some(self.step),
            "plan" => Some(self.plan),
            "past_steps" => Some(none_if_blank(self.past_steps)),
            _ => None,
        }
    }
}

fn none_if_blank(text: &str) -> &str {
    if text.trim().is_empty() { "(none)" } else { text }
}

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    pub workspace: PathBuf,
    pub tool_specs: Vec<ToolSpec>,
}

impl ContextBuilder {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            tool_specs: vec![],
        }
    }

    pub fn with_tool_specs(mut self, tool_specs: Vec<ToolSpec>) -> Self {
        self.tool_specs = tool_specs;
        self
    }

    /// The workspace copy of the template when present and non-blank,
    /// otherwise the built-in one.
    pub fn load_template(&self, kind: PromptKind) -> String {
        match std::fs::read_to_string(self.workspace.join(kind.file_name())) {
            Ok(content) if !content.trim().is_empty() => content,
            _ => kind.default_template().to_string(),
        }
    }

    pub fn build_system_prompt(&self) -> String {
        let mut parts = vec![];
        let instructions = self.get_tool_instructions();
        if !instructions.is_empty() {
            parts.push(instructions);
        }
        parts.push(self.get_runtime_context());
        parts.join("\n\n---\n\n")
    }

    pub fn build_messages(&self, kind: PromptKind, vars: &PromptVars<'_>) -> Vec<ChatMessage> {
        let template = self.load_template(kind);
        vec![
            ChatMessage::system(self.build_system_prompt()),
            ChatMessage::user(vars.render(&template)),
        ]
    }

    fn get_tool_instructions(&self) -> String {
        if self.tool_specs.is_empty() {
            return String::new();
        }

        let mut instructions = String::new();
        instructions.push_str("## Tool Use Protocol\n\n");
        instructions.push_str("To use a tool, wrap a JSON object in <tool_call> tags:\n\n");
        instructions.push_str("```\n<tool_call>\n{\"name\": \"tool_name\", \"arguments\": {\"param\": \"value\"}}\n</tool_call>\n```\n\n");
        instructions.push_str("Output actual <tool_call> tags. Never describe a call instead of making it.\n\n");
        instructions.push_str("After tool execution, results appear as tool messages. ");
        instructions
            .push_str("Continue reasoning with the results until you can give a final answer.\n\n");
        instructions.push_str("### Available Tools\n\n");

        for tool in &self.tool_specs {
            let _ = writeln!(
                instructions,
                "**{}**: {}\nParameters: `{}`\n",
                tool.name, tool.description, tool.parameters_schema
            );
        }

        instructions
    }

    fn get_runtime_context(&self) -> String {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");
        format!("## Runtime Context\n\n### Current Time\n{}", timestamp)
    }
}

/// Writes the built-in templates into `workspace`, leaving existing files
/// alone. Returns the paths that were created.
pub fn write_default_templates(workspace: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("Failed to create workspace at {}", workspace.display()))?;

    let mut written = vec![];
    for kind in PromptKind::ALL {
        let path = workspace.join(kind.file_name());
        if path.exists() {
            continue;
        }
        std::fs::write(&path, kind.default_template())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn placeholders_are_filled() {
        let tmp = TempDir::new().unwrap();
        let builder = ContextBuilder::new(tmp.path());
        let vars = PromptVars {
            objective: "Compare two researchers",
            plan: "Find A\nFind B",
            past_steps: "1. Name: Find A\nResult: a physicist",
            ..Default::default()
        };

        let messages = builder.build_messages(PromptKind::Replan, &vars);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        let user = &messages[1].content;
        assert!(user.contains("Compare two researchers"));
        assert!(user.contains("Find A\nFind B"));
        assert!(user.contains("Result: a physicist"));
        assert!(!user.contains('{'));
    }

    #[test]
    fn values_containing_placeholders_are_not_expanded() {
        let vars = PromptVars {
            objective: "explain {plan} and {past_steps}",
            plan: "SECRET PLAN",
            past_steps: "1. Name: earlier",
            ..Default::default()
        };
        assert_eq!(
            vars.render("Objective: {objective} | {plan} | {unknown} | {"),
            "Objective: explain {plan} and {past_steps} | SECRET PLAN | {unknown} | {"
        );
    }

    #[test]
    fn blank_past_steps_render_as_none() {
        let builder = ContextBuilder::new("/nonexistent");
        let vars = PromptVars {
            step: "Look up the capital of France",
            ..Default::default()
        };
        let messages = builder.build_messages(PromptKind::Execute, &vars);
        assert!(messages[1].content.contains("(none)"));
        assert!(messages[1].content.contains("Look up the capital of France"));
    }

    #[test]
    fn workspace_template_overrides_default() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("PLAN.md"), "Plan this: {objective}").unwrap();
        let builder = ContextBuilder::new(tmp.path());

        let vars = PromptVars {
            objective: "bake bread",
            ..Default::default()
        };
        let messages = builder.build_messages(PromptKind::Plan, &vars);
        assert_eq!(messages[1].content, "Plan this: bake bread");
    }

    #[test]
    fn tool_section_lists_specs() {
        let builder = ContextBuilder::new("/nonexistent").with_tool_specs(vec![ToolSpec {
            name: "search".into(),
            description: "Search the web".into(),
            parameters_schema: json!({"type": "object"}),
        }]);
        let prompt = builder.build_system_prompt();
        assert!(prompt.contains("<tool_call>"));
        assert!(prompt.contains("**search**: Search the web"));
        assert!(prompt.contains("Current Time"));
    }

    #[test]
    fn default_templates_do_not_clobber_edits() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("REPLAN.md"), "mine").unwrap();

        let written = write_default_templates(tmp.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("REPLAN.md")).unwrap(),
            "mine"
        );
        assert!(tmp.path().join("EXECUTE.md").exists());
    }
}
