//! Synthetic PE image builder.
//!
//! Produces minimal but well-formed PE32 / PE32+ images with a single `.idata` section that
//! holds the import descriptors, one empty thunk array and the library name strings. The
//! output parses with `goblin`, so the full load-parse-patch pipeline can be exercised without
//! shipping binary samples.
//!
//! Only depends on `std`; integration tests and benches include this file by path.

#![allow(dead_code)]

/// File offset of the PE signature (`e_lfanew`).
pub const PE_OFFSET: usize = 0x80;
/// File offset of the optional header.
pub const OPTIONAL_HEADER_OFFSET: usize = PE_OFFSET + 0x18;
/// File offset where the raw data of the single section starts.
pub const SECTION_RAW_OFFSET: usize = 0x200;
/// RVA of the single section.
pub const SECTION_RVA: u32 = 0x1000;
/// File offset of the header slack used for decoy strings.
pub const HEADER_DECOY_OFFSET: usize = 0x1B0;

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: usize = 0x1000;
const DESCRIPTOR_SIZE: usize = 20;

/// Result of [`ImageBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltImage {
    /// The complete image bytes
    pub data: Vec<u8>,
    /// File offset of each descriptor's name string, in descriptor order
    pub name_offsets: Vec<usize>,
    /// File offset of the first import descriptor
    pub import_table_offset: usize,
    /// Size of the descriptor table including the terminating null descriptor
    pub import_table_size: usize,
}

struct PendingImport {
    name: String,
    reuse: bool,
}

/// Builder for synthetic PE images.
pub struct ImageBuilder {
    machine: u16,
    pe32_plus: bool,
    magic: Option<u16>,
    imports: Vec<PendingImport>,
    import_directory: bool,
    names_first: bool,
    name_gap: usize,
    header_decoy: Vec<u8>,
    trailer: Vec<u8>,
    os_version: (u16, u16),
    subsystem_version: (u16, u16),
    extra_directories: Vec<(usize, u32, u32)>,
}

impl ImageBuilder {
    /// A 32-bit (`0x014c`, PE32) image.
    pub fn pe32() -> Self {
        Self::with_layout(0x014c, false)
    }

    /// A 64-bit (`0x8664`, PE32+) image.
    pub fn pe32_plus() -> Self {
        Self::with_layout(0x8664, true)
    }

    fn with_layout(machine: u16, pe32_plus: bool) -> Self {
        ImageBuilder {
            machine,
            pe32_plus,
            magic: None,
            imports: Vec::new(),
            import_directory: true,
            names_first: false,
            name_gap: 0,
            header_decoy: Vec::new(),
            trailer: Vec::new(),
            os_version: (6, 0),
            subsystem_version: (6, 0),
            extra_directories: Vec::new(),
        }
    }

    /// Override the COFF machine field.
    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    /// Override the optional header magic.
    pub fn magic(mut self, magic: u16) -> Self {
        self.magic = Some(magic);
        self
    }

    /// Add an import descriptor with its own copy of the name string.
    pub fn import(mut self, name: &str) -> Self {
        self.imports.push(PendingImport {
            name: name.to_string(),
            reuse: false,
        });
        self
    }

    /// Add an import descriptor that points at the name string of an earlier descriptor
    /// with the same name.
    pub fn import_reusing(mut self, name: &str) -> Self {
        self.imports.push(PendingImport {
            name: name.to_string(),
            reuse: true,
        });
        self
    }

    /// Set data directory `index` (other than the import entry) to `rva` / `size`.
    pub fn data_directory(mut self, index: usize, rva: u32, size: u32) -> Self {
        assert!(index != 1 && index < 16);
        self.extra_directories.push((index, rva, size));
        self
    }

    /// Leave the import data directory entry zeroed.
    pub fn without_import_directory(mut self) -> Self {
        self.import_directory = false;
        self
    }

    /// Place the name strings in front of the descriptor table.
    pub fn names_before_descriptors(mut self) -> Self {
        self.names_first = true;
        self
    }

    /// Insert `gap` zero bytes between the thunk array and the name strings.
    pub fn name_gap(mut self, gap: usize) -> Self {
        self.name_gap = gap;
        self
    }

    /// Bytes written into the header slack, before any section data.
    pub fn header_decoy(mut self, bytes: &[u8]) -> Self {
        assert!(HEADER_DECOY_OFFSET + bytes.len() <= SECTION_RAW_OFFSET);
        self.header_decoy = bytes.to_vec();
        self
    }

    /// Bytes appended after the section data (overlay).
    pub fn trailer(mut self, bytes: &[u8]) -> Self {
        self.trailer = bytes.to_vec();
        self
    }

    /// Initial `MajorOperatingSystemVersion` / `MinorOperatingSystemVersion`.
    pub fn os_version(mut self, major: u16, minor: u16) -> Self {
        self.os_version = (major, minor);
        self
    }

    /// Initial `MajorSubsystemVersion` / `MinorSubsystemVersion`.
    pub fn subsystem_version(mut self, major: u16, minor: u16) -> Self {
        self.subsystem_version = (major, minor);
        self
    }

    /// Assemble the image.
    pub fn build(&self) -> BuiltImage {
        let descriptor_table_size = (self.imports.len() + 1) * DESCRIPTOR_SIZE;

        // Lay out the section: [names | descriptors | thunk] or [descriptors | thunk | gap | names]
        let mut section = Vec::new();
        let mut name_rel = Vec::with_capacity(self.imports.len());
        let descriptor_rel;
        let thunk_rel;

        if self.names_first {
            Self::emit_names(&self.imports, &mut section, &mut name_rel);
            align(&mut section, 8);
            descriptor_rel = section.len();
            section.resize(section.len() + descriptor_table_size, 0);
            thunk_rel = section.len();
            section.resize(section.len() + 8, 0);
        } else {
            descriptor_rel = 0;
            section.resize(descriptor_table_size, 0);
            thunk_rel = section.len();
            section.resize(section.len() + 8, 0);
            section.resize(section.len() + self.name_gap, 0);
            Self::emit_names(&self.imports, &mut section, &mut name_rel);
        }

        let rva = |rel: usize| SECTION_RVA + rel as u32;
        for (index, name_offset) in name_rel.iter().enumerate() {
            let at = descriptor_rel + index * DESCRIPTOR_SIZE;
            put_u32(&mut section, at, rva(thunk_rel));
            put_u32(&mut section, at + 12, rva(*name_offset));
            put_u32(&mut section, at + 16, rva(thunk_rel));
        }

        let raw_size = round_up(section.len().max(1), FILE_ALIGNMENT);
        section.resize(raw_size, 0);

        let optional_header_size: u16 = if self.pe32_plus { 0xF0 } else { 0xE0 };
        let mut data = vec![0u8; SECTION_RAW_OFFSET];

        // DOS header
        data[0..2].copy_from_slice(b"MZ");
        put_u32(&mut data, 0x3C, PE_OFFSET as u32);

        // PE signature + COFF header
        data[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");
        let coff = PE_OFFSET + 4;
        put_u16(&mut data, coff, self.machine);
        put_u16(&mut data, coff + 2, 1);
        put_u16(&mut data, coff + 16, optional_header_size);
        put_u16(&mut data, coff + 18, if self.pe32_plus { 0x0022 } else { 0x0102 });

        // Optional header
        let opt = OPTIONAL_HEADER_OFFSET;
        let magic = self
            .magic
            .unwrap_or(if self.pe32_plus { 0x20b } else { 0x10b });
        put_u16(&mut data, opt, magic);
        data[opt + 2] = 14;
        put_u32(&mut data, opt + 0x08, raw_size as u32);
        put_u32(&mut data, opt + 0x14, SECTION_RVA);
        if self.pe32_plus {
            put_u64(&mut data, opt + 0x18, 0x1_4000_0000);
        } else {
            put_u32(&mut data, opt + 0x18, SECTION_RVA);
            put_u32(&mut data, opt + 0x1C, 0x0040_0000);
        }
        put_u32(&mut data, opt + 0x20, SECTION_ALIGNMENT as u32);
        put_u32(&mut data, opt + 0x24, FILE_ALIGNMENT as u32);
        put_u16(&mut data, opt + 0x28, self.os_version.0);
        put_u16(&mut data, opt + 0x2A, self.os_version.1);
        put_u16(&mut data, opt + 0x30, self.subsystem_version.0);
        put_u16(&mut data, opt + 0x32, self.subsystem_version.1);
        let size_of_image = SECTION_ALIGNMENT + round_up(raw_size, SECTION_ALIGNMENT);
        put_u32(&mut data, opt + 0x38, size_of_image as u32);
        put_u32(&mut data, opt + 0x3C, SECTION_RAW_OFFSET as u32);
        put_u16(&mut data, opt + 0x44, 3);

        let directories = if self.pe32_plus { opt + 0x70 } else { opt + 0x60 };
        put_u32(&mut data, directories - 4, 16);
        if self.import_directory {
            put_u32(&mut data, directories + 8, rva(descriptor_rel));
            put_u32(&mut data, directories + 12, descriptor_table_size as u32);
        }
        for &(index, rva, size) in &self.extra_directories {
            put_u32(&mut data, directories + index * 8, rva);
            put_u32(&mut data, directories + index * 8 + 4, size);
        }

        // Section table
        let table = opt + usize::from(optional_header_size);
        data[table..table + 8].copy_from_slice(b".idata\0\0");
        put_u32(&mut data, table + 8, raw_size as u32);
        put_u32(&mut data, table + 12, SECTION_RVA);
        put_u32(&mut data, table + 16, raw_size as u32);
        put_u32(&mut data, table + 20, SECTION_RAW_OFFSET as u32);
        put_u32(&mut data, table + 36, 0xC000_0040);

        if !self.header_decoy.is_empty() {
            data[HEADER_DECOY_OFFSET..HEADER_DECOY_OFFSET + self.header_decoy.len()]
                .copy_from_slice(&self.header_decoy);
        }

        data.extend_from_slice(&section);
        data.extend_from_slice(&self.trailer);

        BuiltImage {
            data,
            name_offsets: name_rel.iter().map(|rel| SECTION_RAW_OFFSET + rel).collect(),
            import_table_offset: SECTION_RAW_OFFSET + descriptor_rel,
            import_table_size: descriptor_table_size,
        }
    }

    fn emit_names(imports: &[PendingImport], section: &mut Vec<u8>, offsets: &mut Vec<usize>) {
        for (index, pending) in imports.iter().enumerate() {
            let earlier = imports[..index]
                .iter()
                .position(|other| other.name == pending.name);

            match earlier {
                Some(first) if pending.reuse => offsets.push(offsets[first]),
                _ => {
                    align(section, 2);
                    offsets.push(section.len());
                    section.extend_from_slice(pending.name.as_bytes());
                    section.push(0);
                }
            }
        }
    }
}

/// Read a little-endian `u16` at `offset`.
pub fn get_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn put_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn align(buffer: &mut Vec<u8>, alignment: usize) {
    let len = round_up(buffer.len(), alignment);
    buffer.resize(len, 0);
}

fn round_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}
