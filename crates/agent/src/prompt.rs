//! System prompt assembly: base instructions, the plan mode overlay and
//! the knowledge context.

use std::path::{Path, PathBuf};

use crate::plan_mode::plan_mode_prompt;

const BASE_SYSTEM_PROMPT: &str = "You are keel, an AI coding assistant running in the user's terminal.

## Capabilities
You have access to these tools:
- read_file: Read file contents with line numbers
- write_file: Create or overwrite files
- edit: Replace specific strings in files (preferred over write_file for modifications)
- shell: Execute commands in the current platform's shell
- glob: Find files by pattern (preferred over shell ls/find)
- grep: Search file contents by regex (preferred over shell grep)
- list_dir: List directory contents
- web_search: Search the web for information
- web_fetch: Fetch and extract content from URLs
- ask_user: Ask the user clarifying questions with choices
- save_knowledge: Save project or user knowledge facts to persistent memory
- enter_plan_mode: Explore the codebase and design an implementation plan before coding
- exit_plan_mode: Signal that the plan is complete and ready for review

## Planning
For non-trivial tasks (new features, multi-file changes, architectural decisions, unclear requirements), call enter_plan_mode BEFORE writing any code so the user can review the approach. Skip planning for simple fixes or when the user gives very specific instructions.

## Rules

### File Operations
- Always read a file before modifying it
- Prefer edit over write_file when changing existing files
- Prefer editing existing files over creating new ones
- Use absolute paths for all file operations
- Do not add comments, docstrings, or type annotations to code you didn't change

### Command Execution
- Generate commands compatible with the current shell ({shell})
- Do not execute destructive commands (rm -rf, format, drop table) unless explicitly asked
- Prefer dedicated tools over shell commands: glob instead of find, grep instead of grep/rg, read_file instead of cat

### Interaction
- When uncertain between approaches, use ask_user to let the user choose
- Keep responses concise and focus on what changed
- Use markdown with language-tagged code blocks

### Security
- Never output API keys, passwords, or secrets
- Never generate code with known security vulnerabilities
- Never commit .env or credential files

## Auto Memory Guidelines
Call save_knowledge when:
- The user tells you about tech stack changes
- The user expresses preferences (code style, reply language, work habits)
- You discover project conventions (naming, layout, test strategy)
- Existing knowledge contradicts the codebase (delete the outdated fact)
Do not save temporary, one-off information.

## Environment
- Platform: {platform}
- Shell: {shell}
- Working Directory: {cwd}";

/// Facts about the machine the prompt describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEnv {
    pub platform: String,
    pub shell: String,
    pub cwd: PathBuf,
}

impl PromptEnv {
    pub fn detect(cwd: impl Into<PathBuf>) -> Self {
        let program = keel_tools::shell_program();
        let shell = Path::new(&program)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or(program);
        Self {
            platform: std::env::consts::OS.to_string(),
            shell,
            cwd: cwd.into(),
        }
    }
}

/// Full system prompt for one turn.
///
/// `plan_file` is set while plan mode is active.
pub fn build_system_prompt(env: &PromptEnv, plan_file: Option<&Path>, knowledge: &str) -> String {
    let mut prompt = BASE_SYSTEM_PROMPT
        .replace("{platform}", &env.platform)
        .replace("{shell}", &env.shell)
        .replace("{cwd}", &env.cwd.display().to_string());

    if let Some(plan_file) = plan_file {
        prompt.push_str("\n\n");
        prompt.push_str(&plan_mode_prompt(plan_file));
    }
    if !knowledge.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(knowledge);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> PromptEnv {
        PromptEnv {
            platform: "linux".into(),
            shell: "bash".into(),
            cwd: PathBuf::from("/work/app"),
        }
    }

    #[test]
    fn fills_environment() {
        let prompt = build_system_prompt(&env(), None, "");
        assert!(prompt.contains("- Platform: linux"));
        assert!(prompt.contains("current shell (bash)"));
        assert!(prompt.contains("- Working Directory: /work/app"));
        assert!(!prompt.contains('{'));
        assert!(!prompt.contains("Plan mode is active"));
    }

    #[test]
    fn overlay_then_knowledge() {
        let plan = PathBuf::from("/work/app/.keel/plans/p.md");
        let prompt = build_system_prompt(&env(), Some(&plan), "## Project Knowledge\n\nfacts");
        let overlay = prompt.find("Plan mode is active").unwrap();
        let knowledge = prompt.find("## Project Knowledge").unwrap();
        assert!(overlay < knowledge);
        assert!(prompt.contains("save your plan to /work/app/.keel/plans/p.md"));
    }

    #[test]
    fn detects_a_shell_name() {
        let env = PromptEnv::detect("/tmp");
        assert!(!env.shell.is_empty());
        assert!(!env.shell.contains('/'));
    }
}
