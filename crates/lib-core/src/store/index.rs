use smol_str::SmolStr;

use crate::ident::EntryId;
use crate::store::cursor::TableCursor;
use crate::store::table::Table;
use crate::value::NormValue;

/// A forward/reverse index pair over one attribute: canonical value → entry
/// id, and entry id → canonical value. The reverse side makes tearing an
/// entry out of the index cheap.
#[derive(Debug, Clone, Default)]
pub struct Index {
    attr_oid: SmolStr,
    forward: Table<NormValue, EntryId>,
    reverse: Table<EntryId, NormValue>,
}

impl Index {
    pub fn new(attr_oid: SmolStr) -> Self {
        Self {
            attr_oid,
            forward: Table::new(),
            reverse: Table::new(),
        }
    }

    pub fn attr_oid(&self) -> &SmolStr {
        &self.attr_oid
    }

    pub fn add(&mut self, value: NormValue, id: EntryId) {
        self.forward.put(value.clone(), id);
        self.reverse.put(id, value);
    }

    pub fn drop_value(&mut self, value: &NormValue, id: EntryId) {
        self.forward.remove_value(value, &id);
        self.reverse.remove_value(&id, value);
    }

    /// Removes every trace of `id` from both sides.
    pub fn drop_id(&mut self, id: EntryId) {
        let values: Vec<NormValue> = self.reverse.values(&id).cloned().collect();
        for value in &values {
            self.forward.remove_value(value, &id);
        }
        self.reverse.remove(&id);
    }

    pub fn has_value(&self, value: &NormValue, id: EntryId) -> bool {
        self.forward.has_value(value, &id)
    }

    pub fn has(&self, value: &NormValue) -> bool {
        self.forward.has(value)
    }

    pub fn first(&self, value: &NormValue) -> Option<EntryId> {
        self.forward.first(value)
    }

    /// How many ids one value maps to: the planner's scan-count source.
    pub fn count(&self, value: &NormValue) -> usize {
        self.forward.count(value)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn cursor(&self) -> TableCursor<NormValue, EntryId> {
        self.forward.cursor()
    }

    pub fn reverse_values(&self, id: EntryId) -> impl Iterator<Item = &NormValue> {
        self.reverse.values(&id)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_drop_id_clears_both_sides() {
        let mut index = Index::new("2.5.4.11".into());
        let id = EntryId::random();
        index.add(NormValue::Text("system".into()), id);
        index.add(NormValue::Text("config".into()), id);
        assert_eq!(index.len(), 2);

        index.drop_id(id);
        assert!(index.is_empty());
        assert!(!index.has(&NormValue::Text("system".into())));
        assert_eq!(index.reverse_values(id).count(), 0);
    }
}
