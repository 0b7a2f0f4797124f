//! Index renumbering after structural changes.
//!
//! `message_index` is a position inside one bucket, so every insert or delete in the
//! store moves the later messages of that bucket. All insert/delete paths of the sync
//! manager go through [`shift_indices`].

use crate::types::identifier::MessageIdentifier;

/// Structural change that happened at `anchor` in the store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum IndexShift {
    /// A message was inserted at the anchor's index.
    Inserted,
    /// The message at the anchor's index was removed.
    Removed,
}

/// Renumbers every identifier in `ids` that shares the anchor's bucket.
///
/// - `Inserted`: indices `>= anchor` move up by one (make room).
/// - `Removed`: indices `> anchor` move down by one (close the gap). An identifier equal to
///   the anchor is left untouched; callers drop it before shifting.
pub(crate) fn shift_indices<'a, I>(ids: I, anchor: &MessageIdentifier, shift: IndexShift)
where
    I: IntoIterator<Item = &'a mut MessageIdentifier>,
{
    for id in ids {
        if !id.same_bucket(anchor) {
            continue;
        }
        match shift {
            IndexShift::Inserted => {
                if id.message_index >= anchor.message_index {
                    id.message_index += 1;
                }
            }
            IndexShift::Removed => {
                if id.message_index > anchor.message_index {
                    id.message_index -= 1;
                }
            }
        }
    }
}
