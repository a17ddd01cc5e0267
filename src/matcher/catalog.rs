use crate::catalog::{ResponseCatalog, ResponseValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    Exact,
    Substring,
}

#[derive(Debug)]
pub struct CatalogHit<'a> {
    pub key: &'a str,
    pub value: &'a ResponseValue,
    pub pass: MatchPass,
}

/// Two passes over the catalog in declared order: exact key equality
/// first, then first key contained in the message. Short keys declared
/// early can shadow longer keys in the second pass; the loader warns
/// about those pairs, the matcher keeps the declared-order tie-break.
pub fn match_catalog<'a>(catalog: &'a ResponseCatalog, normalized: &str) -> Option<CatalogHit<'a>> {
    for entry in catalog.entries() {
        if entry.norm_key() == normalized {
            return Some(CatalogHit {
                key: &entry.key,
                value: &entry.value,
                pass: MatchPass::Exact,
            });
        }
    }

    for entry in catalog.entries() {
        if normalized.contains(entry.norm_key()) {
            return Some(CatalogHit {
                key: &entry.key,
                value: &entry.value,
                pass: MatchPass::Substring,
            });
        }
    }

    None
}
