//! Planner request text.

use crate::codebase::Codebase;
use crate::external::ClientCatalog;

/// Everything that goes into one planner request.
pub struct PlannerRequest<'a> {
    pub codebase: &'a Codebase,
    /// Output of `ActionRegistry::describe`
    pub actions: &'a str,
    pub catalog: &'a [ClientCatalog],
    pub user_request: &'a str,
    /// Recent history, bounded per request
    pub recent: &'a str,
    /// Remembered history older than `recent`, bounded by the token budget
    pub history: &'a str,
    pub protected_paths: &'a [String],
}

impl PlannerRequest<'_> {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);

        out.push_str(
            "You are an assistant that edits a codebase one action at a time. \
             Choose the next action needed to fulfil the user's request.\n\n",
        );

        out.push_str("Codebase files (paths only):\n");
        out.push_str(&self.codebase.to_json());
        out.push_str("\n\nAvailable actions:\n");
        out.push_str(self.actions);
        out.push_str("\n\n");

        out.push_str(&render_catalog(self.catalog));

        out.push_str("User request: ");
        out.push_str(self.user_request);
        out.push_str("\n\nWhat has been done so far:\n");
        out.push_str(self.recent.trim_end());
        out.push_str("\n\nEarlier history:\n");
        out.push_str(if self.history.trim().is_empty() {
            "(empty)"
        } else {
            self.history.trim_end()
        });
        out.push_str("\n\n");

        out.push_str("Rules:\n");
        out.push_str(
            "1. Read a file with READ_FILE before editing, moving or deleting it. \
             READ_FILE and SEARCH_FILES run without confirmation.\n",
        );
        out.push_str("2. Read imported modules when they matter for the change.\n");
        out.push_str("3. Do not repeat an action that the history shows was already done.\n");
        if !self.protected_paths.is_empty() {
            out.push_str("4. Never read or modify these paths:\n");
            for path in self.protected_paths {
                out.push_str(&format!("   - {}\n", path));
            }
        }
        out.push('\n');

        out.push_str(
            "Reply with ONLY one JSON object and no other text. Put any reasoning in the \
             \"prompt\" field. For CREATE_FILE and EDIT_FILE, \"code\" must hold the complete \
             file content.\n\n",
        );
        out.push_str(
            r#"{
  "action": {
    "name": "ACTION_NAME",
    "filePath": "path/to/file",
    "prompt": "What to do with this file and why",
    "code": "Full file content for CREATE_FILE and EDIT_FILE"
  }
}

Several independent steps may be returned at once as an array, executed in order:
{"action": [ {...}, {...} ]}

When the request is complete:
{"action": null}
"#,
        );

        out
    }
}

fn render_catalog(catalog: &[ClientCatalog]) -> String {
    if catalog.is_empty() {
        return "External tool clients: none\n\n".to_string();
    }

    let mut out = String::from(
        "External tool clients (use CALL_TOOL with externalToolRequest \
         {\"clientName\", \"operation\": \"invoke-tool\" | \"read-resource\", \"params\"}):\n",
    );
    for entry in catalog {
        out.push_str(&format!("- {}\n", entry.client));
        for tool in &entry.tools {
            match &tool.description {
                Some(description) => {
                    out.push_str(&format!("    tool {}: {}\n", tool.name, description))
                }
                None => out.push_str(&format!("    tool {}\n", tool.name)),
            }
            if let Some(schema) = &tool.input_schema {
                out.push_str(&format!("      arguments: {}\n", schema));
            }
        }
        for resource in &entry.resources {
            out.push_str(&format!("    resource {}\n", resource.uri));
        }
    }
    out.push('\n');
    out
}
