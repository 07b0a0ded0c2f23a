//! Synthetic PE header images for tests
//!
//! Produces the smallest byte layout that the header parser accepts: a DOS
//! header, the PE signature at `e_lfanew = 0x80`, a COFF file header and a
//! standard-size optional header. No sections are emitted.

use std::io;
use std::path::Path;

use crate::pe::ImageKind;

const LFANEW: usize = 0x80;

/// Builder for minimal PE32 / PE32+ header images
#[derive(Debug, Clone)]
pub struct PeImageBuilder {
    kind: ImageKind,
    sections: u16,
    linker: (u8, u8),
    size_of_code: u32,
    entry_point: u32,
    check_sum: u32,
    subsystem: u16,
    stack: (u64, u64),
    heap: (u64, u64),
}

impl PeImageBuilder {
    pub fn pe32() -> Self {
        Self {
            kind: ImageKind::Pe32,
            sections: 3,
            linker: (14, 0),
            size_of_code: 0x4000,
            entry_point: 0x1000,
            check_sum: 0,
            subsystem: 2,
            stack: (0x10_0000, 0x1000),
            heap: (0x10_0000, 0x1000),
        }
    }

    pub fn pe32_plus() -> Self {
        Self {
            kind: ImageKind::Pe32Plus,
            ..Self::pe32()
        }
    }

    pub fn sections(mut self, n: u16) -> Self {
        self.sections = n;
        self
    }

    pub fn linker(mut self, major: u8, minor: u8) -> Self {
        self.linker = (major, minor);
        self
    }

    pub fn size_of_code(mut self, size: u32) -> Self {
        self.size_of_code = size;
        self
    }

    pub fn entry_point(mut self, rva: u32) -> Self {
        self.entry_point = rva;
        self
    }

    pub fn check_sum(mut self, sum: u32) -> Self {
        self.check_sum = sum;
        self
    }

    pub fn subsystem(mut self, subsystem: u16) -> Self {
        self.subsystem = subsystem;
        self
    }

    pub fn stack(mut self, reserve: u64, commit: u64) -> Self {
        self.stack = (reserve, commit);
        self
    }

    pub fn heap(mut self, reserve: u64, commit: u64) -> Self {
        self.heap = (reserve, commit);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let optional_size: usize = match self.kind {
            ImageKind::Pe32 => 0xE0,
            ImageKind::Pe32Plus => 0xF0,
        };
        let mut image = vec![0u8; LFANEW + 4 + 20 + optional_size];

        // DOS header
        image[0..2].copy_from_slice(b"MZ");
        put_u16(&mut image, 2, 0x90); // e_cblp
        put_u16(&mut image, 4, 3); // e_cp
        put_u16(&mut image, 8, 4); // e_cparhdr
        put_u16(&mut image, 12, 0xFFFF); // e_maxalloc
        put_u16(&mut image, 16, 0xB8); // e_sp
        put_u32(&mut image, 60, LFANEW as u32);

        // PE signature + COFF header
        image[LFANEW..LFANEW + 4].copy_from_slice(b"PE\0\0");
        let fh = LFANEW + 4;
        let machine = match self.kind {
            ImageKind::Pe32 => 0x14c,
            ImageKind::Pe32Plus => 0x8664,
        };
        put_u16(&mut image, fh, machine);
        put_u16(&mut image, fh + 2, self.sections);
        put_u16(&mut image, fh + 16, optional_size as u16);
        put_u16(&mut image, fh + 18, 0x0102);

        // Optional header
        let oh = fh + 20;
        let magic = match self.kind {
            ImageKind::Pe32 => 0x10b,
            ImageKind::Pe32Plus => 0x20b,
        };
        put_u16(&mut image, oh, magic);
        image[oh + 2] = self.linker.0;
        image[oh + 3] = self.linker.1;
        put_u32(&mut image, oh + 4, self.size_of_code);
        put_u32(&mut image, oh + 8, 0x2000);
        put_u32(&mut image, oh + 12, 0);
        put_u32(&mut image, oh + 16, self.entry_point);
        put_u32(&mut image, oh + 20, 0x1000);
        put_u16(&mut image, oh + 40, 6);
        put_u16(&mut image, oh + 42, 0);
        put_u16(&mut image, oh + 44, 0);
        put_u16(&mut image, oh + 46, 0);
        put_u16(&mut image, oh + 48, 6);
        put_u16(&mut image, oh + 50, 0);
        put_u32(&mut image, oh + 64, self.check_sum);
        put_u16(&mut image, oh + 68, self.subsystem);

        match self.kind {
            ImageKind::Pe32 => {
                put_u32(&mut image, oh + 72, self.stack.0 as u32);
                put_u32(&mut image, oh + 76, self.stack.1 as u32);
                put_u32(&mut image, oh + 80, self.heap.0 as u32);
                put_u32(&mut image, oh + 84, self.heap.1 as u32);
                put_u32(&mut image, oh + 92, 16);
            }
            ImageKind::Pe32Plus => {
                put_u64(&mut image, oh + 72, self.stack.0);
                put_u64(&mut image, oh + 80, self.stack.1);
                put_u64(&mut image, oh + 88, self.heap.0);
                put_u64(&mut image, oh + 96, self.heap.1);
                put_u32(&mut image, oh + 108, 16);
            }
        }

        image
    }

    /// Write the image to `path`
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.build())
    }
}

/// Bytes that carry the MZ magic but no valid PE structure behind it
pub fn corrupt_image() -> Vec<u8> {
    let mut image = vec![0u8; 96];
    image[0..2].copy_from_slice(b"MZ");
    image[60..64].copy_from_slice(&0x4000u32.to_le_bytes());
    image
}

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}
