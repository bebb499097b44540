//! Cursor-based pagination utilities

use std::ops::{Deref, DerefMut};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An opaque token representing the pagination position after the last
/// returned result.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Cursor(pub usize);

impl Serialize for Cursor {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let json = serde_json::to_vec(&self.0).map_err(serde::ser::Error::custom)?;
        let encoded = general_purpose::STANDARD.encode(json);
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(&encoded)
            .map_err(serde::de::Error::custom)?;

        let index: usize =
            serde_json::from_slice(&decoded).map_err(serde::de::Error::custom)?;

        Ok(Cursor(index))
    }
}

impl Deref for Cursor {
    type Target = usize;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Cursor {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// One page of items out of an ordered collection.
pub struct Page<T> {
    /// Page items
    pub items: Vec<T>,

    /// The position to resume from, `None` when this is the last page.
    pub next_cursor: Option<Cursor>,
}

/// Pagination over an ordered slice of items.
pub trait Pagination<T: Clone> {
    fn paginate(&self, cursor: Option<Cursor>, page_size: usize) -> Page<T>;
}

impl<T: Clone> Pagination<T> for [T] {
    #[inline]
    fn paginate(&self, cursor: Option<Cursor>, page_size: usize) -> Page<T> {
        let start = usize::min(*cursor.unwrap_or_default(), self.len());
        let end = usize::min(start + page_size, self.len());

        let items = self[start..end].to_vec();
        let next_cursor = if end < self.len() {
            Some(Cursor(end))
        } else {
            None
        };

        Page { items, next_cursor }
    }
}

impl<T: Clone> Pagination<T> for Vec<T> {
    #[inline]
    fn paginate(&self, cursor: Option<Cursor>, page_size: usize) -> Page<T> {
        self.as_slice().paginate(cursor, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_cursors() {
        for i in [0, 1, 42, 9999] {
            let original = Cursor(i);
            let json = serde_json::to_string(&original).unwrap();
            let decoded: Cursor = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn it_rejects_garbage_cursors() {
        let result: Result<Cursor, _> = serde_json::from_str("\"not_base64\"");
        assert!(result.is_err());
    }

    #[test]
    fn it_walks_every_page() {
        let data = vec![1, 2, 3, 4, 5];
        let mut cursor = None;
        let mut collected = vec![];

        loop {
            let page = data.paginate(cursor, 2);
            collected.extend(page.items);
            cursor = page.next_cursor;
            if cursor.is_none() { break; }
        }

        assert_eq!(collected, data);
    }

    #[test]
    fn it_clamps_out_of_range_cursors() {
        let data = vec![1, 2];
        let page = data.paginate(Some(Cursor(10)), 2);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
