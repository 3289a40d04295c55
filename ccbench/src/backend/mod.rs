/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

mod exhaustive;

use std::sync::Arc;

use ccbench_core::IndexAdapter;
use serde::{Deserialize, Serialize};

use crate::datatype::Element;
use exhaustive::Exhaustive;

/// The index implementations the binary can benchmark.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum IndexKind {
    #[default]
    Exhaustive,
}

impl IndexKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Exhaustive => "exhaustive",
        }
    }

    /// Create an empty index of this kind for `dim`-dimensional points.
    pub(crate) fn create<T: Element>(self, dim: usize) -> anyhow::Result<Arc<dyn IndexAdapter<T>>> {
        match self {
            Self::Exhaustive => Ok(Arc::new(Exhaustive::<T>::new(dim)?)),
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_by_kind() {
        let index = IndexKind::Exhaustive.create::<u8>(4).unwrap();
        assert_eq!(index.name(), IndexKind::Exhaustive.as_str());
        assert!(IndexKind::default().create::<f32>(0).is_err());

        let kind: IndexKind = serde_yaml::from_str("exhaustive").unwrap();
        assert_eq!(kind, IndexKind::Exhaustive);
        assert!(serde_yaml::from_str::<IndexKind>("vamana").is_err());
    }
}
