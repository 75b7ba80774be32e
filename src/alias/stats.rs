//! Alias oracle query statistics.
//!
//! An [`AliasStats`] is handed to the oracle by reference. Queries only count when the oracle was
//! given one, so an oracle without statistics does no bookkeeping at all.

use core::cell::Cell;
use core::fmt;

/// Counts of one kind of query, split by outcome.
#[derive(Debug, Default)]
pub struct QueryCounter {
    may_alias: Cell<u64>,
    no_alias: Cell<u64>,
    must_overlap: Cell<u64>,
}

impl QueryCounter {
    /// Record a query that could not be disambiguated.
    pub fn may_alias(&self) {
        self.may_alias.set(self.may_alias.get() + 1);
    }

    /// Record a successful disambiguation.
    pub fn no_alias(&self) {
        self.no_alias.set(self.no_alias.get() + 1);
    }

    /// Record a query that proved both accesses start at the same address.
    pub fn must_overlap(&self) {
        self.must_overlap.set(self.must_overlap.get() + 1);
    }

    /// Record the outcome of a query answering "may alias?".
    pub fn record(&self, may_alias: bool) {
        if may_alias {
            self.may_alias()
        } else {
            self.no_alias()
        }
    }

    /// Number of successful disambiguations.
    pub fn disambiguations(&self) -> u64 {
        self.no_alias.get()
    }

    /// Number of must-overlap results.
    pub fn must_overlaps(&self) -> u64 {
        self.must_overlap.get()
    }

    /// Total number of queries.
    pub fn queries(&self) -> u64 {
        self.may_alias.get() + self.no_alias.get() + self.must_overlap.get()
    }
}

/// Statistics of the alias oracle.
#[derive(Debug, Default)]
pub struct AliasStats {
    /// Reference against reference queries.
    pub refs_may_alias: QueryCounter,
    /// May a call read a reference?
    pub ref_maybe_used_by_call: QueryCounter,
    /// May a call write a reference?
    pub call_may_clobber_ref: QueryCounter,
    /// Access path disambiguation of references with different base types.
    pub aliasing_component_refs: QueryCounter,
    /// Type-based field disambiguation.
    pub nonoverlapping_component_refs: QueryCounter,
    /// Access path matching from a common base.
    pub nonoverlapping_refs_since_match: QueryCounter,
}

impl fmt::Display for AliasStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Alias oracle query stats:")?;
        for (name, c) in [
            ("refs_may_alias", &self.refs_may_alias),
            ("ref_maybe_used_by_call", &self.ref_maybe_used_by_call),
            ("call_may_clobber_ref", &self.call_may_clobber_ref),
            (
                "nonoverlapping_component_refs",
                &self.nonoverlapping_component_refs,
            ),
        ] {
            writeln!(
                f,
                "  {name}: {} disambiguations, {} queries",
                c.disambiguations(),
                c.queries()
            )?;
        }
        let c = &self.nonoverlapping_refs_since_match;
        writeln!(
            f,
            "  nonoverlapping_refs_since_match: {} disambiguations, {} must overlaps, {} queries",
            c.disambiguations(),
            c.must_overlaps(),
            c.queries()
        )?;
        let c = &self.aliasing_component_refs;
        writeln!(
            f,
            "  aliasing_component_refs: {} disambiguations, {} queries",
            c.disambiguations(),
            c.queries()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump() {
        let stats = AliasStats::default();
        stats.refs_may_alias.record(false);
        stats.refs_may_alias.record(true);
        stats.refs_may_alias.record(false);
        stats.nonoverlapping_refs_since_match.must_overlap();
        stats.nonoverlapping_refs_since_match.no_alias();

        let text = stats.to_string();
        assert!(text.starts_with("Alias oracle query stats:\n"));
        assert!(text.contains("  refs_may_alias: 2 disambiguations, 3 queries\n"));
        assert!(text.contains("  call_may_clobber_ref: 0 disambiguations, 0 queries\n"));
        assert!(text.contains(
            "  nonoverlapping_refs_since_match: 1 disambiguations, 1 must overlaps, 2 queries\n"
        ));
    }
}
