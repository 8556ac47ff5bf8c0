//! Mach-O architecture inspection and in-process thinning.
//!
//! Only the headers are interpreted: a thin image contributes its `cputype`,
//! a fat image the `cputype` of every slice. Thinning rewrites a fat file to
//! the requested slices without invoking `lipo`.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    settings::MachArch,
    utils::fs,
};
use goblin::mach::{
    Mach,
    fat::{FAT_CIGAM, FAT_MAGIC, FatArch, FatHeader, SIZEOF_FAT_ARCH, SIZEOF_FAT_HEADER},
    header::{MH_CIGAM, MH_CIGAM_64, MH_MAGIC, MH_MAGIC_64},
    parse_magic_and_ctx,
};
use std::{io::Read, path::Path};

/// Slices found in one Mach-O file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slices {
    /// Universal (fat) container
    pub fat: bool,
    /// Architectures present, sorted and deduplicated
    pub arches: Vec<MachArch>,
}

/// Whether the first bytes of a file carry a Mach-O or fat magic number.
pub fn has_macho_magic(head: &[u8]) -> bool {
    let Some(bytes) = head.get(..4) else {
        return false;
    };
    let be = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let le = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    [FAT_MAGIC, FAT_CIGAM, MH_MAGIC, MH_CIGAM, MH_MAGIC_64, MH_CIGAM_64]
        .iter()
        .any(|&m| m == be || m == le)
}

/// Bytes read from the front of a file when looking for its slices.
const HEAD_LEN: u64 = 4096;

/// Java class files share the fat magic; their version field always reads
/// as far more slices than a real universal binary carries.
const MAX_FAT_ARCHES: usize = 20;

/// Parses the slices named by the headers at the start of an image.
///
/// Returns `None` for data that merely shares a magic number with Mach-O,
/// or whose arch table does not fit in `head`.
pub fn slices(head: &[u8]) -> Option<Slices> {
    let (magic, ctx) = parse_magic_and_ctx(head, 0).ok()?;
    let (fat, mut arches) = match ctx {
        Some(ctx) => {
            let field: [u8; 4] = head.get(4..8)?.try_into().ok()?;
            let cputype = if ctx.le.is_little() {
                u32::from_le_bytes(field)
            } else {
                u32::from_be_bytes(field)
            };
            (false, vec![MachArch::from_cputype(cputype)])
        }
        None if magic == FAT_MAGIC => {
            let count = FatHeader::parse(head).ok()?.nfat_arch as usize;
            if count == 0 || count >= MAX_FAT_ARCHES {
                log::debug!("Fat magic with {} slices, not a universal binary", count);
                return None;
            }
            let mut arches = Vec::with_capacity(count);
            for i in 0..count {
                let arch = FatArch::parse(head, SIZEOF_FAT_HEADER + i * SIZEOF_FAT_ARCH).ok()?;
                arches.push(MachArch::from_cputype(arch.cputype));
            }
            (true, arches)
        }
        None => return None,
    };
    arches.sort();
    arches.dedup();
    Some(Slices { fat, arches })
}

/// Reads the slices of the file at `path`, `None` when it is not Mach-O.
///
/// Only the first page is read; headers and arch tables live there.
pub fn read_slices(path: &Path) -> Result<Option<Slices>> {
    let file = std::fs::File::open(path).fs_context("opening binary", path)?;
    let mut head = Vec::with_capacity(HEAD_LEN as usize);
    file.take(HEAD_LEN)
        .read_to_end(&mut head)
        .fs_context("reading binary header", path)?;
    if !has_macho_magic(&head) {
        return Ok(None);
    }
    Ok(slices(&head))
}

/// Rewrites the fat binary at `path` so that it carries only `keep`.
///
/// A single kept slice becomes a thin image. Permissions are preserved and
/// the file is replaced atomically.
pub async fn thin(path: &Path, keep: &[MachArch]) -> Result<()> {
    let source = path.to_path_buf();
    let keep = keep.to_vec();
    let staged = fs::staging_path(path);
    let target = staged.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let bytes = std::fs::read(&source).fs_context("reading binary", &source)?;
        let Mach::Fat(multi) = Mach::parse(&bytes)? else {
            return Err(Error::GenericError(format!(
                "{} is not a universal binary",
                source.display()
            )));
        };

        let mut kept = Vec::new();
        for arch in multi.iter_arches() {
            let arch = arch?;
            if keep.contains(&MachArch::from_cputype(arch.cputype)) {
                kept.push(arch);
            }
        }
        if kept.is_empty() {
            return Err(Error::GenericError(format!(
                "{} has none of the requested slices",
                source.display()
            )));
        }

        let output = if let [only] = kept.as_slice() {
            only.slice(&bytes).to_vec()
        } else {
            write_fat(&bytes, &kept)
        };

        let permissions = std::fs::metadata(&source)
            .fs_context("reading binary metadata", &source)?
            .permissions();
        std::fs::write(&target, output).fs_context("writing thinned binary", &target)?;
        std::fs::set_permissions(&target, permissions)
            .fs_context("setting binary permissions", &target)?;
        Ok(())
    })
    .await??;

    fs::promote(&staged, path).await
}

/// Serializes a fat container holding the given slices of `bytes`.
fn write_fat(bytes: &[u8], arches: &[FatArch]) -> Vec<u8> {
    const HEADER: usize = 8;
    const ENTRY: usize = 20;

    let mut offsets = Vec::with_capacity(arches.len());
    let mut cursor = HEADER + ENTRY * arches.len();
    for arch in arches {
        let align = 1usize << arch.align.min(16);
        cursor = cursor.div_ceil(align) * align;
        offsets.push(cursor);
        cursor += arch.size as usize;
    }

    let mut out = vec![0u8; cursor];
    out[0..4].copy_from_slice(&FAT_MAGIC.to_be_bytes());
    out[4..8].copy_from_slice(&(arches.len() as u32).to_be_bytes());
    for (i, (arch, &offset)) in arches.iter().zip(&offsets).enumerate() {
        let entry = HEADER + i * ENTRY;
        let fields = [
            arch.cputype,
            arch.cpusubtype,
            offset as u32,
            arch.size,
            arch.align,
        ];
        for (j, field) in fields.iter().enumerate() {
            out[entry + j * 4..entry + j * 4 + 4].copy_from_slice(&field.to_be_bytes());
        }
        let slice = arch.slice(bytes);
        out[offset..offset + slice.len()].copy_from_slice(slice);
    }
    out
}
