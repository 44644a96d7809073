//! Extracted records and the assembled division tree

use crate::model::Level;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One row of a child-listing page
///
/// This is the shape stored in the page cache. A record with a `link` points
/// at the listing page of its own children; a record without one is a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord {
    pub name: String,

    /// 12-digit administrative code; empty for a province listed without a link
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Urban/rural classification, only present on village rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_code: Option<String>,
}

impl ChildRecord {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            link: None,
            category_code: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_category(mut self, category_code: impl Into<String>) -> Self {
        self.category_code = Some(category_code.into());
        self
    }

    /// A record is a leaf when it carries no (non-empty) child-listing link
    pub fn is_leaf(&self) -> bool {
        self.link.as_deref().map_or(true, str::is_empty)
    }
}

/// Children of an assembled node, tagged with their level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Children {
    pub level: Level,
    pub nodes: Vec<AdminNode>,
}

/// One node of the output tree
///
/// Serializes as `{name, code, categoryCode?, <plural>: [...]}` where the
/// plural key (`cities`, `counties`, `towns`, `villages`) names the level of
/// the children. Leaves carry no children key at all, while a linked node
/// whose listing could not be determined carries an empty array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminNode {
    pub name: String,
    pub code: String,
    pub category_code: Option<String>,
    pub children: Option<Children>,
}

impl AdminNode {
    /// Builds a leaf node from an extracted record
    pub fn leaf(record: &ChildRecord) -> Self {
        Self {
            name: record.name.clone(),
            code: record.code.clone(),
            category_code: record.category_code.clone(),
            children: None,
        }
    }

    /// Builds a branch node from an extracted record and its resolved children
    pub fn branch(record: &ChildRecord, level: Level, nodes: Vec<AdminNode>) -> Self {
        Self {
            children: Some(Children { level, nodes }),
            ..Self::leaf(record)
        }
    }

    /// Children of this node, empty for leaves
    pub fn child_nodes(&self) -> &[AdminNode] {
        self.children
            .as_ref()
            .map(|c| c.nodes.as_slice())
            .unwrap_or_default()
    }

    /// Level of this node's children, if it has a children list
    pub fn child_level(&self) -> Option<Level> {
        self.children.as_ref().map(|c| c.level)
    }

    /// Counts this node and all of its descendants
    pub fn count(&self) -> usize {
        1 + self.child_nodes().iter().map(AdminNode::count).sum::<usize>()
    }

    /// Finds a descendant (or this node) by administrative code
    pub fn find(&self, code: &str) -> Option<&AdminNode> {
        if self.code == code {
            return Some(self);
        }
        self.child_nodes().iter().find_map(|child| child.find(code))
    }
}

impl Serialize for AdminNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        if !self.code.is_empty() {
            map.serialize_entry("code", &self.code)?;
        }
        if let Some(category_code) = &self.category_code {
            map.serialize_entry("categoryCode", category_code)?;
        }
        if let Some(children) = &self.children {
            map.serialize_entry(children.level.plural(), &children.nodes)?;
        }
        map.end()
    }
}

/// Trims every kind of whitespace the listing pages pad cells with
///
/// Covers full-width spaces, non-breaking spaces and zero-width spaces in
/// addition to ASCII whitespace.
pub fn clean_text(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\u{200b}' || c == '\u{feff}')
        .to_string()
}
