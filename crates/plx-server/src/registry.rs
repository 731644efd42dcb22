//! Tool registry: named tool specs paired with their dispatch handlers.
//!
//! `tools/call` dispatch goes through the registry rather than inline
//! name conditionals, so adding a tool means adding an entry here.

use plx_core::ToolSpec;
use serde_json::json;
use tracing::info;

/// Name of the builtin search tool.
pub const SEARCH_TOOL_NAME: &str = "perplexity_search";

/// Which backend implementation serves a registered tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolHandler {
    /// Forward the query to the Perplexity chat-completion API.
    PerplexitySearch,
}

/// A tool the server is willing to invoke.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub handler: ToolHandler,
}

/// Ordered registry of invocable tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Create a registry with the builtin tool set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(RegisteredTool {
            spec: ToolSpec {
                name: SEARCH_TOOL_NAME.to_string(),
                description: "Search the web using Perplexity AI and return a synthesized answer"
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query",
                        },
                    },
                    "required": ["query"],
                }),
            },
            handler: ToolHandler::PerplexitySearch,
        });
        registry
    }

    /// Register a tool. A tool with the same name replaces the old entry.
    pub fn register(&mut self, tool: RegisteredTool) {
        info!(name = %tool.spec.name, "registered tool");
        self.tools.retain(|t| t.spec.name != tool.spec.name);
        self.tools.push(tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.spec.name == name)
    }

    /// All tool specs, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    /// Number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.len()
    }
}
