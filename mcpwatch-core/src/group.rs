// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Static tool groups used by the summary views.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolGroup {
    Documentation,
    Versions,
    Migration,
    Language,
    Flavors,
    InitializrJavadoc,
    /// Tools not listed in any other group.
    Other,
}

impl ToolGroup {
    /// Groups with a fixed membership, in display order.
    pub const STATIC: [ToolGroup; 6] = [
        ToolGroup::Documentation,
        ToolGroup::Versions,
        ToolGroup::Migration,
        ToolGroup::Language,
        ToolGroup::Flavors,
        ToolGroup::InitializrJavadoc,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ToolGroup::Documentation => "Documentation",
            ToolGroup::Versions => "Versions",
            ToolGroup::Migration => "Migration",
            ToolGroup::Language => "Language",
            ToolGroup::Flavors => "Flavors",
            ToolGroup::InitializrJavadoc => "Initializr & Javadoc",
            ToolGroup::Other => "Other Tools",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolGroup::Documentation => "Documentation access and search tools",
            ToolGroup::Versions => "Spring Boot version information tools",
            ToolGroup::Migration => "Migration guides and breaking changes",
            ToolGroup::Language => "Java and Kotlin language features",
            ToolGroup::Flavors => "Company guidelines and architecture patterns",
            ToolGroup::InitializrJavadoc => "Project initialization and API documentation",
            ToolGroup::Other => "Miscellaneous tools",
        }
    }

    /// Member tool names. `Other` has no fixed membership.
    pub fn tools(self) -> &'static [&'static str] {
        match self {
            ToolGroup::Documentation => &[
                "searchSpringDocs",
                "getDocumentationByVersion",
                "getCodeExamples",
                "findProjectsByUseCase",
                "listSpringProjects",
            ],
            ToolGroup::Versions => &[
                "listSpringBootVersions",
                "getSpringVersions",
                "getLatestSpringBootVersion",
                "filterSpringBootVersionsBySupport",
                "listProjectsBySpringBootVersion",
            ],
            ToolGroup::Migration => &[
                "getSpringMigrationGuide",
                "getBreakingChanges",
                "searchMigrationKnowledge",
                "getAvailableMigrationPaths",
                "getTransformationsByType",
                "getDeprecationReplacement",
                "checkVersionCompatibility",
            ],
            ToolGroup::Language => &[
                "getLanguageFeatures",
                "getLanguageVersionDiff",
                "getLanguageVersions",
                "getModernPatterns",
                "getSpringBootLanguageRequirements",
                "searchLanguageFeatures",
            ],
            ToolGroup::Flavors => &[
                "searchFlavors",
                "getFlavorByName",
                "getFlavorsByCategory",
                "getArchitecturePatterns",
                "getComplianceRules",
                "getAgentConfiguration",
                "getProjectInitialization",
                "listFlavorCategories",
                "listFlavorGroups",
                "getFlavorsGroup",
                "getFlavorGroupStatistics",
            ],
            ToolGroup::InitializrJavadoc => &[
                "initializrCheckCompatibility",
                "initializrGetBootVersions",
                "initializrGetDependency",
                "initializrGetDependencyCategories",
                "initializrSearchDependencies",
                "getClassDoc",
                "getPackageDoc",
                "listJavadocLibraries",
                "searchJavadocs",
            ],
            ToolGroup::Other => &[],
        }
    }

    /// Group a tool belongs to; unknown tools fall into `Other`.
    pub fn for_tool(tool_name: &str) -> ToolGroup {
        static INDEX: OnceLock<HashMap<&'static str, ToolGroup>> = OnceLock::new();
        let index = INDEX.get_or_init(|| {
            ToolGroup::STATIC
                .iter()
                .flat_map(|g| g.tools().iter().map(move |t| (*t, *g)))
                .collect()
        });
        index.get(tool_name).copied().unwrap_or(ToolGroup::Other)
    }
}

/// Render a camelCase tool name as Title Case: `searchSpringDocs` becomes
/// `Search Spring Docs`.
pub fn display_tool_name(tool_name: &str) -> String {
    let mut out = String::with_capacity(tool_name.len() + 4);
    let mut prev_lower = false;
    for (i, c) in tool_name.chars().enumerate() {
        if c.is_uppercase() && prev_lower {
            out.push(' ');
        }
        if i == 0 {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_lower = c.is_lowercase();
    }
    out
}
