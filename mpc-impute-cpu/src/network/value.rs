use crate::{
    protocol::prf::PrfSeed,
    shares::{IntRing2k, RingElement},
};
use eyre::{bail, eyre, Result};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Payload exchanged between two parties.
///
/// Encoded as a descriptor byte followed by the little endian body. Vectors
/// prefix their body with its byte length as a `u32`.
#[derive(PartialEq, Clone, Debug)]
pub enum NetworkValue {
    PrfKey(PrfSeed),
    RingElement32(RingElement<u32>),
    RingElement64(RingElement<u64>),
    VecRing32(Vec<RingElement<u32>>),
    VecRing64(Vec<RingElement<u64>>),
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum DescriptorByte {
    PrfKey = 0x01,
    RingElement32 = 0x04,
    RingElement64 = 0x05,
    VecRing32 = 0x07,
    VecRing64 = 0x08,
}

impl NetworkValue {
    fn descriptor_byte(&self) -> DescriptorByte {
        match self {
            NetworkValue::PrfKey(_) => DescriptorByte::PrfKey,
            NetworkValue::RingElement32(_) => DescriptorByte::RingElement32,
            NetworkValue::RingElement64(_) => DescriptorByte::RingElement64,
            NetworkValue::VecRing32(_) => DescriptorByte::VecRing32,
            NetworkValue::VecRing64(_) => DescriptorByte::VecRing64,
        }
    }

    pub fn to_network(&self) -> Vec<u8> {
        let mut out = vec![self.descriptor_byte().into()];
        match self {
            NetworkValue::PrfKey(key) => out.extend_from_slice(key),
            NetworkValue::RingElement32(x) => x.convert().put_le(&mut out),
            NetworkValue::RingElement64(x) => x.convert().put_le(&mut out),
            NetworkValue::VecRing32(v) => put_vec(v, &mut out),
            NetworkValue::VecRing64(v) => put_vec(v, &mut out),
        }
        out
    }

    pub fn from_network(serialized: &[u8]) -> Result<Self> {
        let (&first, body) = serialized
            .split_first()
            .ok_or_else(|| eyre!("empty network value"))?;
        let descriptor = DescriptorByte::try_from(first)
            .map_err(|_| eyre!("invalid network value type {first:#04x}"))?;
        let value = match descriptor {
            DescriptorByte::PrfKey => NetworkValue::PrfKey(
                body.try_into()
                    .map_err(|_| eyre!("PRF key of {} bytes", body.len()))?,
            ),
            DescriptorByte::RingElement32 => NetworkValue::RingElement32(element(body)?),
            DescriptorByte::RingElement64 => NetworkValue::RingElement64(element(body)?),
            DescriptorByte::VecRing32 => NetworkValue::VecRing32(elements(body)?),
            DescriptorByte::VecRing64 => NetworkValue::VecRing64(elements(body)?),
        };
        Ok(value)
    }
}

fn put_vec<T: IntRing2k>(values: &[RingElement<T>], out: &mut Vec<u8>) {
    out.extend_from_slice(&((values.len() * T::BYTES) as u32).to_le_bytes());
    for x in values {
        x.convert().put_le(out);
    }
}

fn element<T: IntRing2k>(body: &[u8]) -> Result<RingElement<T>> {
    T::from_le(body)
        .map(RingElement)
        .ok_or_else(|| eyre!("ring element of {} bytes, expected {}", body.len(), T::BYTES))
}

fn elements<T: IntRing2k>(body: &[u8]) -> Result<Vec<RingElement<T>>> {
    let Some((header, payload)) = body.split_first_chunk::<4>() else {
        bail!("vector header truncated");
    };
    let len = u32::from_le_bytes(*header) as usize;
    if len != payload.len() || len % T::BYTES != 0 {
        bail!("vector announces {len} bytes but carries {}", payload.len());
    }
    payload.chunks_exact(T::BYTES).map(element::<T>).collect()
}

/// Ring widths that have a wire representation.
pub trait NetworkInt: IntRing2k {
    fn new_network_element(element: RingElement<Self>) -> NetworkValue;
    fn new_network_vec(elements: Vec<RingElement<Self>>) -> NetworkValue;
    /// Accepts a single element as a vector of one.
    fn into_vec(value: NetworkValue) -> Result<Vec<RingElement<Self>>>;
}

impl NetworkInt for u32 {
    fn new_network_element(element: RingElement<Self>) -> NetworkValue {
        NetworkValue::RingElement32(element)
    }

    fn new_network_vec(elements: Vec<RingElement<Self>>) -> NetworkValue {
        NetworkValue::VecRing32(elements)
    }

    fn into_vec(value: NetworkValue) -> Result<Vec<RingElement<Self>>> {
        match value {
            NetworkValue::VecRing32(x) => Ok(x),
            NetworkValue::RingElement32(x) => Ok(vec![x]),
            other => bail!("expected 32-bit ring elements, got {:?}", other.descriptor_byte()),
        }
    }
}

impl NetworkInt for u64 {
    fn new_network_element(element: RingElement<Self>) -> NetworkValue {
        NetworkValue::RingElement64(element)
    }

    fn new_network_vec(elements: Vec<RingElement<Self>>) -> NetworkValue {
        NetworkValue::VecRing64(elements)
    }

    fn into_vec(value: NetworkValue) -> Result<Vec<RingElement<Self>>> {
        match value {
            NetworkValue::VecRing64(x) => Ok(x),
            NetworkValue::RingElement64(x) => Ok(vec![x]),
            other => bail!("expected 64-bit ring elements, got {:?}", other.descriptor_byte()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_layout() {
        let value = NetworkValue::RingElement64(RingElement(0x0102_0304_0506_0708));
        let bytes = value.to_network();
        assert_eq!(bytes, vec![0x05, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(NetworkValue::from_network(&bytes).unwrap(), value);
    }

    #[test]
    fn test_vec_and_key_decoding() {
        let values = [
            (NetworkValue::PrfKey([7; 32]), 33),
            (
                NetworkValue::VecRing64(vec![RingElement(1), RingElement(u64::MAX)]),
                21,
            ),
            (NetworkValue::VecRing32(vec![]), 5),
        ];
        for (value, len) in values {
            let bytes = value.to_network();
            assert_eq!(bytes.len(), len);
            assert_eq!(NetworkValue::from_network(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(NetworkValue::from_network(&[]).is_err());
        assert!(NetworkValue::from_network(&[0xff]).is_err());
        assert!(NetworkValue::from_network(&[0x05, 1, 2]).is_err());
        assert!(NetworkValue::from_network(&[0x08, 1]).is_err());
        // header announces 16 bytes but carries 8
        let mut bytes = vec![0x08];
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 8]);
        assert!(NetworkValue::from_network(&bytes).is_err());
    }

    #[test]
    fn test_into_vec_conversions() {
        let single = u64::into_vec(NetworkValue::RingElement64(RingElement(3))).unwrap();
        assert_eq!(single, vec![RingElement(3)]);
        assert!(u32::into_vec(NetworkValue::RingElement64(RingElement(3))).is_err());
    }
}
