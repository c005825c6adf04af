use std::convert::TryFrom;

use byteorder::{BigEndian, WriteBytesExt};

/// Canonically serialize an object.
/// This serialization is used for security related applications (signing buffers and hashing),
/// therefore the serialization result must be the same on any system.
pub trait CanonicalSerialize {
    fn canonical_serialize(&self) -> Vec<u8>;
}

impl<T> CanonicalSerialize for Option<T>
where
    T: CanonicalSerialize,
{
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        match &self {
            None => {
                res_data.push(0);
            }
            Some(t) => {
                res_data.push(1);
                res_data.extend_from_slice(&t.canonical_serialize());
            }
        };
        res_data
    }
}

impl<T> CanonicalSerialize for Vec<T>
where
    T: CanonicalSerialize,
{
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        // Write length:
        res_data
            .write_u64::<BigEndian>(u64::try_from(self.len()).unwrap())
            .unwrap();
        // Write all items:
        for t in self.iter() {
            res_data.extend_from_slice(&t.canonical_serialize());
        }
        res_data
    }
}

impl CanonicalSerialize for String {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data
            .write_u64::<BigEndian>(u64::try_from(self.len()).unwrap())
            .unwrap();
        res_data.extend_from_slice(self.as_bytes());
        res_data
    }
}

impl CanonicalSerialize for u8 {
    fn canonical_serialize(&self) -> Vec<u8> {
        vec![*self]
    }
}

impl CanonicalSerialize for u16 {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.write_u16::<BigEndian>(*self).unwrap();
        res_data
    }
}

impl CanonicalSerialize for u32 {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.write_u32::<BigEndian>(*self).unwrap();
        res_data
    }
}

impl CanonicalSerialize for u64 {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.write_u64::<BigEndian>(*self).unwrap();
        res_data
    }
}

impl CanonicalSerialize for u128 {
    fn canonical_serialize(&self) -> Vec<u8> {
        let mut res_data = Vec::new();
        res_data.write_u128::<BigEndian>(*self).unwrap();
        res_data
    }
}

impl<T, W> CanonicalSerialize for (T, W)
where
    T: CanonicalSerialize,
    W: CanonicalSerialize,
{
    fn canonical_serialize(&self) -> Vec<u8> {
        let (t, w) = self;
        let mut res_data = Vec::new();
        res_data.extend_from_slice(&t.canonical_serialize());
        res_data.extend_from_slice(&w.canonical_serialize());
        res_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_serialize_prefix_free() {
        // Strings of different lengths must serialize differently:
        let short = String::from("ab").canonical_serialize();
        let long = String::from("abc").canonical_serialize();
        assert_ne!(short, long);
        assert_eq!(&short[..8], &[0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn test_canonical_serialize_option() {
        let none: Option<u64> = None;
        assert_eq!(none.canonical_serialize(), vec![0]);
        let some: Option<u64> = Some(5);
        assert_eq!(some.canonical_serialize(), vec![1, 0, 0, 0, 0, 0, 0, 0, 5]);
    }
}
