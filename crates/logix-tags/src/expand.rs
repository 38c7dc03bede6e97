//! Array dimension expansion into concrete instance names.

use itertools::Itertools;
use tracing::{trace, warn};

use crate::{TagDescriptor, TagError};

/// Result of expanding a batch of descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Instance names in descriptor order, each descriptor's product in row-major order.
    pub instances: Vec<String>,
    /// Descriptors that were excluded because their metadata was malformed.
    pub rejected: Vec<TagError>,
}

/// Enumerate every instance name a descriptor declares.
///
/// Unused (zero) slots are dropped first. A scalar yields its base name;
/// otherwise the cartesian product of `0..size` per slot is rendered as
/// `name[i0][i1]..` with the leftmost index varying slowest.
pub fn expand(descriptor: &TagDescriptor) -> Result<Vec<String>, TagError> {
    let mut sizes = Vec::with_capacity(descriptor.dimensions.len());
    for (slot, &size) in descriptor.dimensions.iter().enumerate() {
        if size < 0 {
            return Err(TagError::MalformedDescriptor {
                tag: descriptor.name.clone(),
                slot,
                size,
            });
        }
        if size != 0 {
            sizes.push(size as u64);
        }
    }

    if sizes.is_empty() {
        return Ok(vec![descriptor.name.clone()]);
    }

    trace!(tag = %descriptor.name, ?sizes, "expanding array tag");
    let names = sizes
        .into_iter()
        .map(|size| 0..size)
        .multi_cartesian_product()
        .map(|indices| {
            indices
                .into_iter()
                .fold(descriptor.name.clone(), |name, index| format!("{name}[{index}]"))
        })
        .collect();
    Ok(names)
}

/// Expand each descriptor in order and concatenate the results.
///
/// Malformed descriptors contribute no names; their errors are collected in
/// [`Expansion::rejected`].
pub fn expand_all<'a, I>(descriptors: I) -> Expansion
where
    I: IntoIterator<Item = &'a TagDescriptor>,
{
    let mut expansion = Expansion::default();
    for descriptor in descriptors {
        match expand(descriptor) {
            Ok(names) => expansion.instances.extend(names),
            Err(err) => {
                warn!(tag = %descriptor.name, %err, "rejecting tag");
                expansion.rejected.push(err);
            }
        }
    }
    expansion
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(dims: &[i64]) -> TagDescriptor {
        TagDescriptor::new("X", "T").with_dimensions(dims.to_vec())
    }

    const SIX: [&str; 6] = ["X[0][0]", "X[0][1]", "X[0][2]", "X[1][0]", "X[1][1]", "X[1][2]"];

    #[test]
    fn scalar_keeps_base_name() {
        assert_eq!(expand(&tag(&[0, 0, 0])).unwrap(), ["X"]);
        assert_eq!(expand(&tag(&[])).unwrap(), ["X"]);
    }

    #[test]
    fn two_dimensions_row_major() {
        assert_eq!(expand(&tag(&[2, 3])).unwrap(), SIX);
    }

    #[test]
    fn zero_slots_are_dropped_wherever_they_sit() {
        assert_eq!(expand(&tag(&[0, 2, 0, 3])).unwrap(), SIX);
    }

    #[test]
    fn single_dimension() {
        assert_eq!(expand(&tag(&[3, 0, 0])).unwrap(), ["X[0]", "X[1]", "X[2]"]);
    }

    #[test]
    fn three_dimensions_vary_rightmost_fastest() {
        let names = expand(&tag(&[2, 2, 2])).unwrap();
        assert_eq!(names.len(), 8);
        assert_eq!(names[0], "X[0][0][0]");
        assert_eq!(names[1], "X[0][0][1]");
        assert_eq!(names[2], "X[0][1][0]");
        assert_eq!(names[7], "X[1][1][1]");
    }

    #[test]
    fn expansion_is_deterministic() {
        let descriptor = tag(&[4, 0, 5]);
        assert_eq!(expand(&descriptor).unwrap(), expand(&descriptor).unwrap());
    }

    #[test]
    fn large_arrays_are_not_truncated() {
        let names = expand(&tag(&[1000, 0, 0])).unwrap();
        assert_eq!(names.len(), 1000);
        assert_eq!(names.last().map(String::as_str), Some("X[999]"));
    }

    #[test]
    fn negative_size_is_rejected() {
        let err = expand(&tag(&[-1])).unwrap_err();
        assert_eq!(
            err,
            TagError::MalformedDescriptor {
                tag: "X".into(),
                slot: 0,
                size: -1
            }
        );
    }

    #[test]
    fn expand_all_concatenates_in_order_and_skips_malformed() {
        let tags = vec![
            TagDescriptor::new("Tank1", "P_AIn").with_dimensions([0, 0]),
            TagDescriptor::new("Bad", "P_AIn").with_dimensions([2, -1]),
            TagDescriptor::new("Tank2", "P_AIn").with_dimensions([2, 0]),
        ];
        let expansion = expand_all(&tags);
        assert_eq!(expansion.instances, ["Tank1", "Tank2[0]", "Tank2[1]"]);
        assert_eq!(expansion.rejected.len(), 1);
        assert!(expansion.instances.iter().all(|name| !name.contains('-')));
        assert!(matches!(
            &expansion.rejected[0],
            TagError::MalformedDescriptor { tag, slot: 1, size: -1 } if tag == "Bad"
        ));
    }
}
