use anyhow::{anyhow, ensure, Result};
use half::f16;
use tile_rs::graph::{Graph, Tensor};
use tile_rs::IpuType;

/// Byte storage of every graph variable; constants start from their data, the rest from zero.
#[derive(Debug, Clone)]
pub struct Memory {
    buffers: Vec<Vec<u8>>,
}

impl Memory {
    pub fn new(graph: &Graph) -> Self {
        let buffers = graph
            .variables()
            .iter()
            .map(|var| match var.initial_data() {
                Some(data) => data.to_vec(),
                None => vec![0u8; var.num_elements() * var.dtype.size_in_bytes()],
            })
            .collect();
        Self { buffers }
    }

    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    /// Raw little-endian bytes of `tensor`, in row-major order.
    pub fn read_bytes(&self, tensor: &Tensor) -> Result<Vec<u8>> {
        let width = tensor.element_type().size_in_bytes();
        let mut out = Vec::with_capacity(tensor.num_elements() * width);
        for iv in tensor.intervals() {
            let buffer = self
                .buffers
                .get(iv.variable.0 as usize)
                .ok_or_else(|| anyhow!("no storage for variable {:?}", iv.variable))?;
            let chunk = buffer
                .get(iv.begin * width..iv.end * width)
                .ok_or_else(|| anyhow!("interval {iv:?} exceeds variable storage"))?;
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }

    pub fn write_bytes(&mut self, tensor: &Tensor, data: &[u8]) -> Result<()> {
        let width = tensor.element_type().size_in_bytes();
        ensure!(
            data.len() == tensor.num_elements() * width,
            "writing {} bytes into a {:?} {:?} tensor",
            data.len(),
            tensor.element_type(),
            tensor.shape()
        );
        let mut cursor = 0usize;
        for iv in tensor.intervals() {
            let buffer = self
                .buffers
                .get_mut(iv.variable.0 as usize)
                .ok_or_else(|| anyhow!("no storage for variable {:?}", iv.variable))?;
            let len = iv.len() * width;
            let chunk = buffer
                .get_mut(iv.begin * width..iv.end * width)
                .ok_or_else(|| anyhow!("interval {iv:?} exceeds variable storage"))?;
            chunk.copy_from_slice(&data[cursor..cursor + len]);
            cursor += len;
        }
        Ok(())
    }

    pub fn read<T: HostValue>(&self, tensor: &Tensor) -> Result<Vec<T>> {
        check_dtype::<T>(tensor)?;
        Ok(decode_all(&self.read_bytes(tensor)?))
    }

    pub fn write<T: HostValue>(&mut self, tensor: &Tensor, values: &[T]) -> Result<()> {
        check_dtype::<T>(tensor)?;
        self.write_bytes(tensor, &encode_all(values))
    }
}

fn check_dtype<T: HostValue>(tensor: &Tensor) -> Result<()> {
    ensure!(
        T::DTYPES.contains(&tensor.element_type()),
        "host type does not match tensor element type {:?}",
        tensor.element_type()
    );
    Ok(())
}

/// Host scalar with a fixed little-endian encoding.
pub trait HostValue: Copy + PartialOrd + std::fmt::Debug {
    const WIDTH: usize;
    /// Element types stored with this host representation.
    const DTYPES: &'static [IpuType];

    fn decode(bytes: &[u8]) -> Self;
    fn encode(self, out: &mut Vec<u8>);
}

macro_rules! impl_host_value {
    ($ty:ty, $width:expr, [$($dtype:expr),+]) => {
        impl HostValue for $ty {
            const WIDTH: usize = $width;
            const DTYPES: &'static [IpuType] = &[$($dtype),+];

            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(&bytes[..$width]);
                <$ty>::from_le_bytes(raw)
            }

            fn encode(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_host_value!(f32, 4, [IpuType::Float]);
impl_host_value!(f16, 2, [IpuType::Half]);
impl_host_value!(i32, 4, [IpuType::Int]);
impl_host_value!(u32, 4, [IpuType::UnsignedInt]);
impl_host_value!(i16, 2, [IpuType::Short]);
impl_host_value!(u16, 2, [IpuType::UnsignedShort]);
impl_host_value!(u8, 1, [IpuType::Bool, IpuType::UnsignedChar, IpuType::Char]);
impl_host_value!(i8, 1, [IpuType::SignedChar]);

pub fn decode_all<T: HostValue>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::WIDTH).map(T::decode).collect()
}

pub fn encode_all<T: HostValue>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::WIDTH);
    for value in values {
        value.encode(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_little_endian() {
        assert_eq!(encode_all(&[1u32, 0x0102_0304]), vec![1, 0, 0, 0, 4, 3, 2, 1]);
        assert_eq!(decode_all::<i16>(&[0xff, 0xff, 2, 0]), vec![-1, 2]);
        let halves = [f16::from_f32(1.5), f16::from_f32(-2.0)];
        assert_eq!(decode_all::<f16>(&encode_all(&halves)), halves.to_vec());
    }
}
