//! XCLBIN container reader.
//!
//! Only what kernel loading needs: the header, the section table, and the
//! kernel names declared in the embedded metadata XML.
//!
//! # Example
//! ```no_run
//! use aie_kernel_tests::runtime::Xclbin;
//!
//! let xclbin = Xclbin::from_file("build/final.xclbin")?;
//! println!("{} kernels: {:?}", xclbin.uuid(), xclbin.kernel_names());
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use memmap2::Mmap;
use regex::Regex;
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Magic bytes for XCLBIN format: "xclbin2\0"
pub const XCLBIN_MAGIC: [u8; 8] = *b"xclbin2\0";

/// Offset of `struct axlf_header`.
pub const HEADER_OFFSET: usize = 0x130;

/// Offset of the first `struct axlf_section_header`.
pub const SECTIONS_OFFSET: usize = 0x1C8;

/// Size of one section header.
pub const SECTION_HEADER_SIZE: usize = 40;

/// Section kinds this reader cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    EmbeddedMetadata,
    MemTopology,
    IpLayout,
    AieMetadata,
    AiePartition,
    Other(u32),
}

impl From<u32> for SectionKind {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::EmbeddedMetadata,
            6 => Self::MemTopology,
            8 => Self::IpLayout,
            25 => Self::AieMetadata,
            32 => Self::AiePartition,
            other => Self::Other(other),
        }
    }
}

/// Raw XCLBIN header (152 bytes), `struct axlf_header`.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawHeader {
    pub length: u64,
    pub time_stamp: u64,
    pub feature_rom_time_stamp: u64,
    pub version_patch: u16,
    pub version_major: u8,
    pub version_minor: u8,
    pub mode: u16,
    pub action_mask: u16,
    pub interface_uuid: [u8; 16],
    pub platform_vbnv: [u8; 64],
    pub xclbin_uuid: [u8; 16],
    pub debug_bin: [u8; 16],
    pub num_sections: u32,
    _padding: u32,
}

/// Raw section header (40 bytes), `struct axlf_section_header`.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSectionHeader {
    pub section_kind: u32,
    pub section_name: [u8; 16],
    pub section_offset: u64,
    pub section_size: u64,
}

/// A section borrowed from the mapped file.
#[derive(Debug)]
pub struct Section<'a> {
    pub kind: SectionKind,
    pub name: String,
    pub data: &'a [u8],
}

/// A parsed XCLBIN file.
pub struct Xclbin {
    mmap: Mmap,
    header: RawHeader,
    section_headers: Vec<RawSectionHeader>,
}

fn kernel_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r#"<kernel\s+name="([^"]+)""#).expect("static regex"))
}

fn c_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl Xclbin {
    /// Map and parse an XCLBIN file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        // Safety: the file is opened read-only and not modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to mmap {}", path.display()))?;

        Self::from_mmap(mmap).with_context(|| format!("Invalid xclbin {}", path.display()))
    }

    fn from_mmap(mmap: Mmap) -> Result<Self> {
        let data = &mmap[..];
        if data.len() < SECTIONS_OFFSET {
            bail!("File too small: {} bytes (minimum {})", data.len(), SECTIONS_OFFSET);
        }
        if data[0..8] != XCLBIN_MAGIC {
            bail!("Invalid magic: expected {:?}, got {:?}", XCLBIN_MAGIC, &data[0..8]);
        }

        let (header, _) = RawHeader::read_from_prefix(&data[HEADER_OFFSET..])
            .map_err(|e| anyhow!("Failed to parse header: {:?}", e))?;

        let num_sections = header.num_sections as usize;
        if num_sections > 0x10000 {
            bail!("Invalid section count: {}", num_sections);
        }

        let mut section_headers = Vec::with_capacity(num_sections);
        for i in 0..num_sections {
            let offset = SECTIONS_OFFSET + i * SECTION_HEADER_SIZE;
            if offset + SECTION_HEADER_SIZE > data.len() {
                bail!("Section header {} extends past end of file", i);
            }
            let (section, _) = RawSectionHeader::read_from_prefix(&data[offset..])
                .map_err(|e| anyhow!("Failed to parse section header {}: {:?}", i, e))?;
            section_headers.push(section);
        }

        Ok(Self { mmap, header, section_headers })
    }

    /// XCLBIN UUID.
    pub fn uuid(&self) -> uuid::Uuid {
        uuid::Uuid::from_bytes(self.header.xclbin_uuid)
    }

    /// Platform string (e.g. "xilinx:npu1:...").
    pub fn platform(&self) -> String {
        c_str(&self.header.platform_vbnv)
    }

    pub fn num_sections(&self) -> usize {
        self.section_headers.len()
    }

    /// Iterate over all sections. Out-of-range sections come back empty.
    pub fn sections(&self) -> impl Iterator<Item = Section<'_>> {
        let data = &self.mmap[..];
        self.section_headers.iter().map(move |hdr| {
            let offset = (hdr.section_offset as usize).min(data.len());
            let end = offset.saturating_add(hdr.section_size as usize).min(data.len());
            Section {
                kind: SectionKind::from(hdr.section_kind),
                name: c_str(&hdr.section_name),
                data: &data[offset..end],
            }
        })
    }

    /// First section of a given kind.
    pub fn find_section(&self, kind: SectionKind) -> Option<Section<'_>> {
        self.sections().find(|s| s.kind == kind)
    }

    /// Kernel names from the embedded metadata, in declaration order.
    pub fn kernel_names(&self) -> Vec<String> {
        let Some(section) = self.find_section(SectionKind::EmbeddedMetadata) else {
            return Vec::new();
        };
        let xml = String::from_utf8_lossy(section.data);
        kernel_tag()
            .captures_iter(&xml)
            .map(|c| c[1].to_string())
            .collect()
    }

    /// Log a summary at info level.
    pub fn log_summary(&self) {
        log::info!(
            "xclbin {} platform '{}' v{}.{}.{}, {} sections",
            self.uuid(),
            self.platform(),
            self.header.version_major,
            self.header.version_minor,
            self.header.version_patch,
            self.num_sections()
        );
        for (i, section) in self.sections().enumerate() {
            log::debug!("  [{:2}] {:?} \"{}\" {} bytes", i, section.kind, section.name, section.data.len());
        }
    }
}
