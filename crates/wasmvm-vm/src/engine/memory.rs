//! Regions: the `(offset, capacity, length)` triple through which byte
//! buffers cross between host and contract memory.

use crate::error::{VmError, VmResult};
use wasmi::{AsContext, AsContextMut, Memory};

/// Size of a serialized region in contract memory.
pub const REGION_SIZE: usize = 12;

/// Description of a buffer in contract memory, stored little-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub offset: u32,
    pub capacity: u32,
    pub length: u32,
}

impl Region {
    pub fn to_bytes(&self) -> [u8; REGION_SIZE] {
        let mut out = [0u8; REGION_SIZE];
        out[0..4].copy_from_slice(&self.offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.capacity.to_le_bytes());
        out[8..12].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; REGION_SIZE]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            offset: word(0),
            capacity: word(4),
            length: word(8),
        }
    }

    /// Reject regions a well-behaved allocator can never produce.
    pub fn validate(&self) -> VmResult<()> {
        if self.offset == 0 {
            return Err(VmError::InvalidHostInput("Region has zero offset".to_string()));
        }
        if self.length > self.capacity {
            return Err(VmError::InvalidHostInput(format!(
                "Region length {} exceeds capacity {}",
                self.length, self.capacity
            )));
        }
        if self.offset.checked_add(self.capacity).is_none() {
            return Err(VmError::InvalidHostInput(
                "Region end exceeds address space".to_string(),
            ));
        }
        Ok(())
    }
}

fn out_of_bounds(what: &str, e: impl std::fmt::Display) -> VmError {
    VmError::InvalidHostInput(format!("{} out of bounds: {}", what, e))
}

pub fn get_region(memory: &Memory, ctx: impl AsContext, ptr: u32) -> VmResult<Region> {
    let mut buf = [0u8; REGION_SIZE];
    memory
        .read(&ctx, ptr as usize, &mut buf)
        .map_err(|e| out_of_bounds("Region header", e))?;
    let region = Region::from_bytes(buf);
    region.validate()?;
    Ok(region)
}

fn set_region(memory: &Memory, mut ctx: impl AsContextMut, ptr: u32, region: Region) -> VmResult<()> {
    memory
        .write(&mut ctx, ptr as usize, &region.to_bytes())
        .map_err(|e| out_of_bounds("Region header", e))
}

/// Copy the bytes a region points at, refusing anything longer than `max_length`.
pub fn read_region(memory: &Memory, ctx: impl AsContext, ptr: u32, max_length: usize) -> VmResult<Vec<u8>> {
    let region = get_region(memory, &ctx, ptr)?;
    if region.length as usize > max_length {
        return Err(VmError::InvalidHostInput(format!(
            "Region length {} exceeds limit {}",
            region.length, max_length
        )));
    }

    let mut data = vec![0u8; region.length as usize];
    memory
        .read(&ctx, region.offset as usize, &mut data)
        .map_err(|e| out_of_bounds("Region data", e))?;
    Ok(data)
}

/// Like [`read_region`], but a null pointer means "no value".
pub fn maybe_read_region(
    memory: &Memory,
    ctx: impl AsContext,
    ptr: u32,
    max_length: usize,
) -> VmResult<Option<Vec<u8>>> {
    if ptr == 0 {
        return Ok(None);
    }
    read_region(memory, ctx, ptr, max_length).map(Some)
}

/// Write `data` into the buffer of an existing region and update its length.
pub fn write_region(memory: &Memory, mut ctx: impl AsContextMut, ptr: u32, data: &[u8]) -> VmResult<()> {
    let mut region = get_region(memory, &ctx, ptr)?;
    let length = u32::try_from(data.len())
        .map_err(|_| VmError::InvalidHostInput("Data exceeds 4 GiB".to_string()))?;
    if length > region.capacity {
        return Err(VmError::InvalidHostInput(format!(
            "Region capacity {} too small for {} bytes",
            region.capacity, length
        )));
    }

    memory
        .write(&mut ctx, region.offset as usize, data)
        .map_err(|e| out_of_bounds("Region data", e))?;
    region.length = length;
    set_region(memory, &mut ctx, ptr, region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmi::{Engine, Linker, Module, Store};

    fn memory_fixture() -> (Store<()>, Memory) {
        let engine = Engine::default();
        let wasm = wat::parse_str(r#"(module (memory (export "memory") 1))"#).unwrap();
        let module = Module::new(&engine, &wasm[..]).unwrap();
        let mut store = Store::new(&engine, ());
        let instance = Linker::<()>::new(&engine)
            .instantiate(&mut store, &module)
            .unwrap()
            .start(&mut store)
            .unwrap();
        let memory = instance.get_memory(&store, "memory").unwrap();
        (store, memory)
    }

    #[test]
    fn test_region_bytes() {
        let region = Region {
            offset: 0x0102_0304,
            capacity: 16,
            length: 8,
        };
        let bytes = region.to_bytes();
        assert_eq!(&bytes[0..4], &[4, 3, 2, 1]);
        assert_eq!(Region::from_bytes(bytes), region);
    }

    #[test]
    fn test_region_validation() {
        assert!(Region { offset: 0, capacity: 1, length: 0 }.validate().is_err());
        assert!(Region { offset: 8, capacity: 1, length: 2 }.validate().is_err());
        assert!(Region { offset: u32::MAX, capacity: 2, length: 0 }.validate().is_err());
        assert!(Region { offset: 8, capacity: 4, length: 4 }.validate().is_ok());
    }

    #[test]
    fn test_write_then_read() {
        let (mut store, memory) = memory_fixture();
        let header = Region {
            offset: 1024,
            capacity: 32,
            length: 0,
        };
        memory.write(&mut store, 100, &header.to_bytes()).unwrap();

        write_region(&memory, &mut store, 100, b"hello").unwrap();
        assert_eq!(read_region(&memory, &store, 100, 64).unwrap(), b"hello".to_vec());
        assert_eq!(get_region(&memory, &store, 100).unwrap().length, 5);
    }

    #[test]
    fn test_limits_enforced() {
        let (mut store, memory) = memory_fixture();
        let header = Region {
            offset: 1024,
            capacity: 4,
            length: 0,
        };
        memory.write(&mut store, 100, &header.to_bytes()).unwrap();

        assert!(write_region(&memory, &mut store, 100, b"too long").is_err());
        write_region(&memory, &mut store, 100, b"abcd").unwrap();
        assert!(read_region(&memory, &store, 100, 3).is_err());
        assert_eq!(maybe_read_region(&memory, &store, 0, 3).unwrap(), None);
    }

    #[test]
    fn test_pointer_outside_memory() {
        let (store, memory) = memory_fixture();
        assert!(get_region(&memory, &store, 70_000).is_err());
    }
}
