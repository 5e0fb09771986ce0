//! In-memory tool repository.
//!
//! Stores manuals by name and exposes their tools for lookup and search. No
//! I/O happens here, so `get_tools`/`get_tool`/`search_tools` never suspend
//! — a plain `std::sync::RwLock` is the right primitive (read contention is
//! the only possible wait, never an I/O wait). Backed by an order-preserving
//! `IndexMap` rather than a plain `HashMap` so `get_tools` reflects
//! manual-registration order.

use std::sync::RwLock;

use indexmap::IndexMap;

use utcp_types::{Manual, Tool};

use crate::error::{ClientError, Result};

#[derive(Debug, Default)]
pub struct ToolRepository {
    manuals: RwLock<IndexMap<String, Manual>>,
}

impl ToolRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `manual` under `name`, replacing any prior manual of that
    /// name. Rejects a manual containing two tools with the same name —
    /// tool names must be unique within a manual.
    pub fn save_manual(&self, name: String, manual: Manual) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for tool in &manual.tools {
            if !seen.insert(tool.name.clone()) {
                return Err(ClientError::DuplicateToolName {
                    manual: name,
                    tool_name: tool.name.clone(),
                });
            }
        }
        self.manuals.write().unwrap().insert(name, manual);
        Ok(())
    }

    /// Removes a manual and all its tools, atomically — there is no
    /// intermediate state where some of its tools are gone and others
    /// remain, since the whole `Manual` entry is removed in one write.
    pub fn remove_manual(&self, name: &str) -> Option<Manual> {
        self.manuals.write().unwrap().shift_remove(name)
    }

    pub fn get_manual(&self, name: &str) -> Option<Manual> {
        self.manuals.read().unwrap().get(name).cloned()
    }

    /// Every tool across every manual, in manual-registration order then
    /// tool-declaration order.
    pub fn get_tools(&self) -> Vec<Tool> {
        self.manuals
            .read()
            .unwrap()
            .values()
            .flat_map(|m| m.tools.iter().cloned())
            .collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<Tool> {
        self.manuals
            .read()
            .unwrap()
            .values()
            .find_map(|m| m.tools.iter().find(|t| t.name == name).cloned())
    }

    /// Case-insensitive substring search over `name + description + tags`,
    /// ranked exact name > name prefix > name substring > description
    /// substring > tag match, ties broken lexicographically by name.
    pub fn search_tools(&self, query: &str, limit: usize) -> Vec<Tool> {
        let query_lower = query.to_lowercase();
        let manuals = self.manuals.read().unwrap();

        let mut ranked: Vec<(u8, Tool)> = manuals
            .values()
            .flat_map(|m| m.tools.iter())
            .filter_map(|tool| rank(tool, &query_lower).map(|r| (r, tool.clone())))
            .collect();

        ranked.sort_by(|(rank_a, a), (rank_b, b)| rank_a.cmp(rank_b).then_with(|| a.name.cmp(&b.name)));
        ranked.into_iter().take(limit).map(|(_, tool)| tool).collect()
    }

    pub fn clear(&self) {
        self.manuals.write().unwrap().clear();
    }
}

fn rank(tool: &Tool, query_lower: &str) -> Option<u8> {
    let name_lower = tool.name.to_lowercase();
    if name_lower == query_lower {
        return Some(0);
    }
    if name_lower.starts_with(query_lower) {
        return Some(1);
    }
    if name_lower.contains(query_lower) {
        return Some(2);
    }
    if tool.description.to_lowercase().contains(query_lower) {
        return Some(3);
    }
    if tool.tags.iter().any(|t| t.to_lowercase().contains(query_lower)) {
        return Some(4);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use utcp_types::{CallTemplate, DirectCallTemplate, JsonSchema};

    fn tool(name: &str, description: &str, tags: &[&str]) -> Tool {
        Tool {
            name: name.to_string(),
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            inputs: JsonSchema::empty(),
            outputs: JsonSchema::empty(),
            tool_call_template: CallTemplate::DirectCall(DirectCallTemplate {
                name: "m".to_string(),
                callable_name: "c".to_string(),
                auth: None,
                allowed_communication_protocols: None,
            }),
        }
    }

    fn manual(name: &str, tools: Vec<Tool>) -> Manual {
        Manual { name: name.to_string(), utcp_version: "1.0.1".to_string(), manual_version: "1.0.0".to_string(), tools }
    }

    #[test]
    fn duplicate_tool_names_within_a_manual_are_rejected() {
        let repo = ToolRepository::new();
        let m = manual("m", vec![tool("m.a", "", &[]), tool("m.a", "", &[])]);
        let err = repo.save_manual("m".to_string(), m).unwrap_err();
        assert!(matches!(err, ClientError::DuplicateToolName { .. }));
    }

    #[test]
    fn deregister_removes_every_tool_atomically() {
        let repo = ToolRepository::new();
        repo.save_manual("m".to_string(), manual("m", vec![tool("m.a", "", &[]), tool("m.b", "", &[])]))
            .unwrap();
        assert_eq!(repo.get_tools().len(), 2);
        repo.remove_manual("m");
        assert!(repo.get_tools().is_empty());
    }

    #[test]
    fn search_ranks_exact_match_above_substring() {
        let repo = ToolRepository::new();
        repo.save_manual(
            "m".to_string(),
            manual(
                "m",
                vec![
                    tool("m.weather_forecast", "", &[]),
                    tool("m.weather", "", &[]),
                    tool("m.get_weather_alerts", "describes weather alerts", &[]),
                ],
            ),
        )
        .unwrap();

        let results = repo.search_tools("weather", 10);
        assert_eq!(results[0].name, "m.weather");
        assert!(results.iter().any(|t| t.name == "m.weather_forecast"));
    }

    #[test]
    fn search_respects_limit() {
        let repo = ToolRepository::new();
        repo.save_manual(
            "m".to_string(),
            manual("m", vec![tool("m.a", "", &["x"]), tool("m.b", "", &["x"]), tool("m.c", "", &["x"])]),
        )
        .unwrap();
        let results = repo.search_tools("x", 2);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn search_results_are_a_subset_of_repository_tools() {
        let repo = ToolRepository::new();
        repo.save_manual("m".to_string(), manual("m", vec![tool("m.alpha", "", &[]), tool("m.beta", "", &[])]))
            .unwrap();
        let all_names: std::collections::HashSet<_> = repo.get_tools().into_iter().map(|t| t.name).collect();
        for t in repo.search_tools("a", 10) {
            assert!(all_names.contains(&t.name));
        }
    }
}
