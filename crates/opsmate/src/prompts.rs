use chrono::Utc;
use indoc::formatdoc;

use crate::toolkits::Toolkit;

/// Build the assistant system prompt, listing whatever toolkits the agent
/// actually carries.
pub fn assistant_prompt(toolkits: &[Box<dyn Toolkit>]) -> String {
    let tool_lines: String = toolkits
        .iter()
        .map(|toolkit| {
            format!(
                "- {}: {}\n  {}",
                toolkit.name(),
                toolkit.description(),
                toolkit.instructions()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    formatdoc! {"
        # Role
        You are an operations assistant capable of natural conversation and
        operational management. Understand user intent from natural language,
        handle both casual conversation and operational tasks, and take
        appropriate actions based on context.

        # Capabilities
        - Monitor operations and detect logistics and production problems
        - Analyze the impact of delays and propose schedule changes
        - Coordinate schedule edits and team notifications

        # Available Tools
        {tools}

        # Response Guidelines
        - Be conversational but professional
        - Explain actions clearly and confirm understanding when appropriate
        - Never apply schedule changes without explicit approval
        - Current datetime: {now}
        ",
        tools = tool_lines,
        now = Utc::now().to_rfc3339(),
    }
}
