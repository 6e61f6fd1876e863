//! Find results.

use bson::{Bson, Document};
use serde::Serialize;

/// Pagination metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub total: i64,
}

/// A page of documents with the total match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaginatedResult {
    pub meta: Meta,
    pub data: Vec<Document>,
}

impl PaginatedResult {
    /// Reads the output of a `$facet` pagination pipeline.
    ///
    /// A facet over zero matches has no `meta` entry, which reads as a
    /// total of 0.
    pub fn from_facet(documents: Vec<Document>) -> Self {
        let Some(facet) = documents.into_iter().next() else {
            return Self::default();
        };

        let total = facet
            .get_document("meta")
            .ok()
            .and_then(|meta| meta.get("total"))
            .and_then(|total| match total {
                Bson::Int32(n) => Some(i64::from(*n)),
                Bson::Int64(n) => Some(*n),
                Bson::Double(n) => Some(*n as i64),
                _ => None,
            })
            .unwrap_or(0);

        let data = facet
            .get_array("data")
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_document().cloned())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            meta: Meta { total },
            data,
        }
    }

    pub fn to_document(&self) -> Document {
        let data: Vec<Bson> = self.data.iter().cloned().map(Bson::Document).collect();
        bson::doc! {
            "meta": { "total": self.meta.total },
            "data": data,
        }
    }
}

/// Outcome of a find.
#[derive(Debug, Clone, PartialEq)]
pub enum FindResult {
    List(Vec<Document>),
    Paginated(PaginatedResult),
}

impl FindResult {
    pub fn documents(&self) -> &[Document] {
        match self {
            Self::List(documents) => documents,
            Self::Paginated(page) => &page.data,
        }
    }

    pub fn into_bson(self) -> Bson {
        match self {
            Self::List(documents) => Bson::Array(documents.into_iter().map(Bson::Document).collect()),
            Self::Paginated(page) => Bson::Document(page.to_document()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_zero_matches_read_as_empty_page() {
        let page = PaginatedResult::from_facet(vec![doc! {"data": []}]);
        assert_eq!(page.meta.total, 0);
        assert!(page.data.is_empty());
        assert_eq!(page.to_document(), doc! {"meta": {"total": 0_i64}, "data": []});

        assert_eq!(PaginatedResult::from_facet(Vec::new()), PaginatedResult::default());
    }

    #[test]
    fn test_facet_with_matches() {
        let page = PaginatedResult::from_facet(vec![doc! {
            "meta": {"total": 12},
            "data": [{"title": "a"}, {"title": "b"}]
        }]);
        assert_eq!(page.meta.total, 12);
        assert_eq!(page.data.len(), 2);
    }
}
