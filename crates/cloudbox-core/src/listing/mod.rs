//! Listing queries and folder navigation.
//!
//! A [`ListQuery`] is both the request sent to `GET /files/list` and the
//! identity of the resulting listing: the selection store clears itself when
//! the identity changes.

use std::fmt;

use serde::Serialize;

use crate::api::{Category, FileEntity, FileId};

/// What to list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ListQuery {
    /// Folder to list; `None` is the root
    pub parent_id: Option<FileId>,
    /// Only entries of this category
    pub category: Option<Category>,
    /// Only entries whose name matches
    pub search: Option<String>,
}

impl ListQuery {
    /// The root folder, unfiltered.
    pub fn root() -> Self {
        Self::default()
    }

    /// Query string parameters, omitting unset fields.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(parent) = self.parent_id {
            pairs.push(("parent_id", parent.to_string()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.as_str().to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        pairs
    }
}

impl fmt::Display for ListQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent_id {
            Some(id) => write!(f, "folder {id}")?,
            None => f.write_str("/")?,
        }
        if let Some(category) = self.category {
            write!(f, " [{category}]")?;
        }
        if let Some(search) = &self.search {
            write!(f, " matching '{search}'")?;
        }
        Ok(())
    }
}

/// Tracks which listing the user is looking at.
#[derive(Debug, Clone, Default)]
pub struct Navigator {
    query: ListQuery,
}

impl Navigator {
    /// Start at the root.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current query.
    pub const fn query(&self) -> &ListQuery {
        &self.query
    }

    /// Enter a folder. Filters are dropped.
    pub fn open_folder(&mut self, id: FileId) -> &ListQuery {
        self.query = ListQuery {
            parent_id: Some(id),
            ..ListQuery::default()
        };
        &self.query
    }

    /// Show one category across all folders, or everything with `None`.
    pub fn show_category(&mut self, category: Option<Category>) -> &ListQuery {
        self.query = ListQuery {
            category,
            ..ListQuery::default()
        };
        &self.query
    }

    /// Search by name. Blank text clears the search.
    pub fn search(&mut self, text: &str) -> &ListQuery {
        let text = text.trim();
        self.query.search = (!text.is_empty()).then(|| text.to_string());
        &self.query
    }

    /// Jump straight to `query`.
    pub fn go(&mut self, query: ListQuery) -> &ListQuery {
        self.query = query;
        &self.query
    }

    /// Back to the unfiltered root.
    pub fn root(&mut self) -> &ListQuery {
        self.query = ListQuery::root();
        &self.query
    }
}

/// A loaded listing.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Query that produced it
    pub query: ListQuery,
    /// Entries in server order
    pub entities: Vec<FileEntity>,
}

impl Listing {
    /// Wrap a server answer.
    pub fn new(query: ListQuery, entities: Vec<FileEntity>) -> Self {
        Self { query, entities }
    }

    /// Ids in display order.
    pub fn ids(&self) -> Vec<FileId> {
        self.entities.iter().map(|e| e.id).collect()
    }

    /// Look up an entry.
    pub fn get(&self, id: FileId) -> Option<&FileEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_skip_unset() {
        assert!(ListQuery::root().query_pairs().is_empty());

        let query = ListQuery {
            parent_id: Some(FileId(5)),
            category: Some(Category::Image),
            search: Some("beach".into()),
        };
        assert_eq!(
            query.query_pairs(),
            vec![
                ("parent_id", "5".to_string()),
                ("category", "image".to_string()),
                ("search", "beach".to_string()),
            ]
        );
    }

    #[test]
    fn test_navigation_changes_identity() {
        let mut nav = Navigator::new();
        let root = nav.query().clone();

        nav.open_folder(FileId(3));
        assert_ne!(nav.query(), &root);
        assert_eq!(nav.query().parent_id, Some(FileId(3)));

        nav.show_category(Some(Category::Video));
        assert_eq!(nav.query().parent_id, None);
        assert_eq!(nav.query().category, Some(Category::Video));

        nav.root();
        assert_eq!(nav.query(), &root);
    }

    #[test]
    fn test_blank_search_clears() {
        let mut nav = Navigator::new();
        nav.search("  report ");
        assert_eq!(nav.query().search.as_deref(), Some("report"));
        nav.search("   ");
        assert_eq!(nav.query().search, None);
    }

    #[test]
    fn test_display() {
        let query = ListQuery {
            parent_id: None,
            category: Some(Category::Audio),
            search: Some("live".into()),
        };
        assert_eq!(query.to_string(), "/ [audio] matching 'live'");
    }
}
