//! A value of one of two types

use serde::{Deserialize, Serialize, Serializer};

/// Represents a value of one of two types.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Either<L, R> {
    /// Left value
    Left(L),

    /// Right value
    Right(R),
}

impl<L, R> Serialize for Either<L, R>
where
    L: Serialize,
    R: Serialize,
{
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Either::Left(l) => l.serialize(serializer),
            Either::Right(r) => r.serialize(serializer),
        }
    }
}
