//! Minimal modification lists between two attribute snapshots.

use crate::client::{AttributeMap, Modification};

/// Computes the modifications that turn `old` into `new`.
///
/// Attributes only in `new` become [`Modification::Add`], attributes whose value lists differ
/// become [`Modification::Replace`], attributes only in `old` become
/// [`Modification::Delete`]. Value lists are compared as ordered sequences, so reordering the
/// values of an attribute counts as a change. Callers must not rely on the output order.
#[must_use]
pub fn diff(new: &AttributeMap, old: &AttributeMap) -> Vec<Modification> {
    let changed = new.iter().filter_map(|(attribute, values)| match old.get(attribute) {
        None => Some(Modification::Add {
            attribute: attribute.clone(),
            values: values.clone(),
        }),
        Some(previous) if previous != values => Some(Modification::Replace {
            attribute: attribute.clone(),
            values: values.clone(),
        }),
        Some(_) => None,
    });

    let removed = old
        .keys()
        .filter(|attribute| !new.contains_key(*attribute))
        .map(|attribute| Modification::Delete {
            attribute: attribute.clone(),
        });

    changed.chain(removed).collect()
}

/// Applies `modifications` to `attributes` the way a directory server would.
///
/// Used to check that a diff reproduces its target; `Add` on an existing attribute appends.
pub fn apply(attributes: &mut AttributeMap, modifications: &[Modification]) {
    for modification in modifications {
        match modification {
            Modification::Add { attribute, values } => attributes
                .entry(attribute.clone())
                .or_default()
                .extend(values.iter().cloned()),
            Modification::Replace { attribute, values } => {
                attributes.insert(attribute.clone(), values.clone());
            }
            Modification::Delete { attribute } => {
                attributes.remove(attribute);
            }
        }
    }
}
