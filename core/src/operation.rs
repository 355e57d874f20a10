use serde::{Deserialize, Serialize};

/// An atomic intent to mutate document text.
///
/// Positions and lengths count UTF-16 code units of the content, matching
/// textarea-style clients. `Noop` is only ever produced by transformation;
/// clients never send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        position: u32,
        text: String,
        #[serde(rename = "baseVersion")]
        base_version: u64,
    },
    Delete {
        position: u32,
        length: u32,
        #[serde(rename = "baseVersion")]
        base_version: u64,
    },
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationShapeError {
    #[error("insert text must not be empty")]
    EmptyInsert,
    #[error("delete length must be at least 1")]
    ZeroLengthDelete,
    #[error("noop operations are server-internal")]
    ClientNoop,
}

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> u32 {
    text.encode_utf16().count() as u32
}

impl Operation {
    pub fn insert(position: u32, text: impl Into<String>, base_version: u64) -> Self {
        Operation::Insert {
            position,
            text: text.into(),
            base_version,
        }
    }

    pub fn delete(position: u32, length: u32, base_version: u64) -> Self {
        Operation::Delete {
            position,
            length,
            base_version,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Operation::Noop)
    }

    pub fn base_version(&self) -> u64 {
        match self {
            Operation::Insert { base_version, .. } | Operation::Delete { base_version, .. } => {
                *base_version
            }
            Operation::Noop => 0,
        }
    }

    pub fn with_base_version(self, base_version: u64) -> Self {
        match self {
            Operation::Insert { position, text, .. } => Operation::Insert {
                position,
                text,
                base_version,
            },
            Operation::Delete {
                position, length, ..
            } => Operation::Delete {
                position,
                length,
                base_version,
            },
            Operation::Noop => Operation::Noop,
        }
    }

    /// Validate the shape constraints a client-submitted operation must meet.
    /// Out-of-range positions are not rejected here; they are clamped at
    /// apply time.
    pub fn validate(&self) -> Result<(), OperationShapeError> {
        match self {
            Operation::Insert { text, .. } if text.is_empty() => {
                Err(OperationShapeError::EmptyInsert)
            }
            Operation::Delete { length, .. } if *length == 0 => {
                Err(OperationShapeError::ZeroLengthDelete)
            }
            Operation::Noop => Err(OperationShapeError::ClientNoop),
            _ => Ok(()),
        }
    }

    /// Transform `self` so it applies *after* `other`, assuming both were
    /// produced against the same base state.
    ///
    /// Tie-break for equal insert positions: the already-accepted `other`
    /// wins the position and shifts `self` right. Inserts landing inside a
    /// concurrently deleted region collapse onto the deletion point; deletes
    /// never expand to absorb concurrently inserted text.
    pub fn transform_against(&self, other: &Operation) -> Operation {
        match (self, other) {
            (op, Operation::Noop) => op.clone(),
            (Operation::Noop, _) => Operation::Noop,

            (
                Operation::Insert {
                    position: a_pos,
                    text,
                    base_version,
                },
                Operation::Insert {
                    position: b_pos,
                    text: b_text,
                    ..
                },
            ) => {
                let position = if *b_pos <= *a_pos {
                    a_pos + utf16_len(b_text)
                } else {
                    *a_pos
                };
                Operation::Insert {
                    position,
                    text: text.clone(),
                    base_version: *base_version,
                }
            }

            (
                Operation::Insert {
                    position: a_pos,
                    text,
                    base_version,
                },
                Operation::Delete {
                    position: b_pos,
                    length: b_len,
                    ..
                },
            ) => {
                let position = if b_pos + b_len <= *a_pos {
                    a_pos - b_len
                } else if *b_pos < *a_pos {
                    *b_pos
                } else {
                    *a_pos
                };
                Operation::Insert {
                    position,
                    text: text.clone(),
                    base_version: *base_version,
                }
            }

            (
                Operation::Delete {
                    position: a_pos,
                    length,
                    base_version,
                },
                Operation::Insert {
                    position: b_pos,
                    text: b_text,
                    ..
                },
            ) => {
                let position = if *b_pos <= *a_pos {
                    a_pos + utf16_len(b_text)
                } else {
                    *a_pos
                };
                Operation::Delete {
                    position,
                    length: *length,
                    base_version: *base_version,
                }
            }

            (
                Operation::Delete {
                    position: a_pos,
                    length: a_len,
                    base_version,
                },
                Operation::Delete {
                    position: b_pos,
                    length: b_len,
                    ..
                },
            ) => {
                let a_end = a_pos + a_len;
                let b_end = b_pos + b_len;

                if *b_pos >= a_end {
                    self.clone()
                } else if b_end <= *a_pos {
                    Operation::Delete {
                        position: a_pos - b_len,
                        length: *a_len,
                        base_version: *base_version,
                    }
                } else {
                    let overlap = a_end.min(b_end) - (*a_pos).max(*b_pos);
                    let length = a_len.saturating_sub(overlap);
                    if length == 0 {
                        Operation::Noop
                    } else {
                        Operation::Delete {
                            position: (*a_pos).min(*b_pos),
                            length,
                            base_version: *base_version,
                        }
                    }
                }
            }
        }
    }

    /// Materialize the operation on `content`, clamping out-of-range
    /// positions to `[0, len]` and delete ends to `len`.
    ///
    /// The splice happens in UTF-16 code units; a clamped delete that lands
    /// between the halves of a surrogate pair decodes lossily, which keeps
    /// apply total and deterministic across replicas.
    pub fn apply(&self, content: &str) -> String {
        match self {
            Operation::Noop => content.to_owned(),
            Operation::Insert { position, text, .. } => {
                let mut units: Vec<u16> = content.encode_utf16().collect();
                let at = (*position as usize).min(units.len());
                let inserted: Vec<u16> = text.encode_utf16().collect();
                units.splice(at..at, inserted);
                String::from_utf16_lossy(&units)
            }
            Operation::Delete {
                position, length, ..
            } => {
                let mut units: Vec<u16> = content.encode_utf16().collect();
                let start = (*position as usize).min(units.len());
                let end = (start + *length as usize).min(units.len());
                units.drain(start..end);
                String::from_utf16_lossy(&units)
            }
        }
    }
}
