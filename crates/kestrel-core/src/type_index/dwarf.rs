//! DWARF-backed type index.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, Dwarf, EndianArcSlice, Reader, RunTimeEndian, SectionId,
    Unit, UnitOffset, UnitSectionOffset,
};
use once_cell::sync::OnceCell;
use tracing::debug;

use super::{Enumerator, TypeDescriptor, TypeIndex, TypeKind, TypeMember, TypeQuery};
use crate::elf::ElfFile;
use crate::error::{KestrelError, Result};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;

const MAX_TYPE_REF_DEPTH: usize = 32;

const DWARF_SECTIONS: &[SectionId] = &[
    SectionId::DebugAbbrev,
    SectionId::DebugAddr,
    SectionId::DebugInfo,
    SectionId::DebugLine,
    SectionId::DebugLineStr,
    SectionId::DebugLoc,
    SectionId::DebugLocLists,
    SectionId::DebugRanges,
    SectionId::DebugRngLists,
    SectionId::DebugStr,
    SectionId::DebugStrOffsets,
    SectionId::DebugTypes,
];

fn map_dwarf_error(context: &str, err: gimli::Error) -> KestrelError
{
    KestrelError::MalformedTarget(format!("{context}: {err}"))
}

struct LoadedDwarf
{
    dwarf: OwnedDwarf,
    units: Vec<Unit<OwnedReader>>,
}

/// Debug sections of one ELF file; parsed on first lookup.
struct DwarfImage
{
    path: PathBuf,
    endian: RunTimeEndian,
    sections: Vec<(SectionId, Arc<[u8]>)>,
    loaded: OnceCell<LoadedDwarf>,
}

impl DwarfImage
{
    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let data = self
            .sections
            .iter()
            .find(|(section, _)| *section == id)
            .map_or_else(|| Arc::<[u8]>::from(Vec::new()), |(_, data)| Arc::clone(data));
        EndianArcSlice::new(data, self.endian)
    }

    fn load(&self) -> Result<&LoadedDwarf>
    {
        self.loaded.get_or_try_init(|| {
            let dwarf = Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section)))
                .map_err(|err| map_dwarf_error("loading DWARF", err))?;
            let mut units = Vec::new();
            let mut headers = dwarf.units();
            while let Some(header) = headers
                .next()
                .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
            {
                units.push(dwarf.unit(header).map_err(|err| map_dwarf_error("parsing compilation unit", err))?);
            }
            let mut type_headers = dwarf.type_units();
            while let Some(header) = type_headers
                .next()
                .map_err(|err| map_dwarf_error("reading .debug_types unit header", err))?
            {
                units.push(dwarf.unit(header).map_err(|err| map_dwarf_error("parsing type unit", err))?);
            }
            debug!(path = %self.path.display(), units = units.len(), "loaded DWARF");
            Ok(LoadedDwarf { dwarf, units })
        })
    }
}

/// Type index over the DWARF of one or more ELF files
///
/// Adding a file only copies its debug sections; units are parsed the first
/// time a lookup reaches that file. Results, including misses, are cached by
/// query string.
#[derive(Default)]
pub struct DwarfTypeIndex
{
    images: Vec<DwarfImage>,
    cache: RwLock<HashMap<String, Option<Arc<TypeDescriptor>>>>,
}

impl DwarfTypeIndex
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add the debug information of `elf`.
    ///
    /// Returns `false`, leaving the index unchanged, if the file has no
    /// `.debug_info` section.
    ///
    /// ## Errors
    ///
    /// `MalformedTarget` if a debug section can't be decompressed.
    pub fn add_file(&mut self, elf: &ElfFile) -> Result<bool>
    {
        let mut sections = Vec::new();
        for &id in DWARF_SECTIONS {
            if let Some(data) = elf.section_bytes(&[id.name()])? {
                sections.push((id, data));
            }
        }
        if !sections.iter().any(|(id, _)| *id == SectionId::DebugInfo) {
            return Ok(false);
        }
        self.images.try_reserve(1)?;
        self.images.push(DwarfImage {
            path: elf.path().to_path_buf(),
            endian: elf.platform().endian(),
            sections,
            loaded: OnceCell::new(),
        });
        self.cache.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(true)
    }

    /// Number of files contributing debug information.
    pub fn file_count(&self) -> usize
    {
        self.images.len()
    }

    fn search(&self, accept: &dyn Fn(&str, TypeKind) -> bool) -> Result<Option<TypeDescriptor>>
    {
        for image in &self.images {
            let loaded = image.load()?;
            let extractor = TypeExtractor {
                dwarf: &loaded.dwarf,
                units: &loaded.units,
            };
            if let Some(found) = extractor.describe(accept)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

impl TypeIndex for DwarfTypeIndex
{
    fn find(&self, name: &str) -> Result<Option<Arc<TypeDescriptor>>>
    {
        if let Some(cached) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(name) {
            return Ok(cached.clone());
        }

        let query = TypeQuery::parse(name);
        let mut found = self.search(&|candidate, kind| query.matches(candidate, kind))?;
        if found.is_none() && query.kind.is_none() {
            found = self.search(&|candidate, kind| kind.is_tagged() && candidate == query.name)?;
        }
        let found = found.map(Arc::new);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), found.clone());
        Ok(found)
    }
}

impl std::fmt::Debug for DwarfTypeIndex
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let paths: Vec<_> = self.images.iter().map(|image| image.path.display().to_string()).collect();
        f.debug_struct("DwarfTypeIndex").field("files", &paths).finish()
    }
}

struct TypeExtractor<'a>
{
    dwarf: &'a OwnedDwarf,
    units: &'a [Unit<OwnedReader>],
}

impl TypeExtractor<'_>
{
    fn describe(&self, accept: &dyn Fn(&str, TypeKind) -> bool) -> Result<Option<TypeDescriptor>>
    {
        for unit in self.units {
            let mut cursor = unit.entries();
            while let Some((_delta, entry)) = cursor.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
                let Some(kind) = self.entry_kind(entry)? else {
                    continue;
                };
                if self.is_declaration(entry)? {
                    continue;
                }
                let Some(name) = self.entry_name(unit, entry)? else {
                    continue;
                };
                if accept(&name, kind) {
                    return self.build_descriptor(unit, entry, name, kind).map(Some);
                }
            }
        }
        Ok(None)
    }

    fn entry_kind(&self, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> Result<Option<TypeKind>>
    {
        let kind = match entry.tag() {
            constants::DW_TAG_base_type => {
                let encoding = entry
                    .attr_value(constants::DW_AT_encoding)
                    .map_err(|err| map_dwarf_error("reading DW_AT_encoding", err))?;
                match encoding {
                    Some(AttributeValue::Encoding(constants::DW_ATE_boolean)) => TypeKind::Bool,
                    Some(AttributeValue::Encoding(constants::DW_ATE_float | constants::DW_ATE_complex_float)) => {
                        TypeKind::Float
                    }
                    _ => TypeKind::Int,
                }
            }
            constants::DW_TAG_structure_type => TypeKind::Struct,
            constants::DW_TAG_class_type => TypeKind::Class,
            constants::DW_TAG_union_type => TypeKind::Union,
            constants::DW_TAG_enumeration_type => TypeKind::Enum,
            constants::DW_TAG_typedef => TypeKind::Typedef,
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    fn is_declaration(&self, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> Result<bool>
    {
        let value = entry
            .attr_value(constants::DW_AT_declaration)
            .map_err(|err| map_dwarf_error("reading DW_AT_declaration", err))?;
        Ok(matches!(value, Some(AttributeValue::Flag(true))))
    }

    fn build_descriptor(
        &self,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        name: String,
        kind: TypeKind,
    ) -> Result<TypeDescriptor>
    {
        let mut descriptor = TypeDescriptor::new(name, kind, self.type_size(unit, entry, 0)?);
        match kind {
            TypeKind::Struct | TypeKind::Class | TypeKind::Union => {
                descriptor.members = self.collect_members(unit, entry.offset())?;
            }
            TypeKind::Enum => {
                descriptor.enumerators = self.collect_enumerators(unit, entry.offset())?;
            }
            _ => {}
        }
        Ok(descriptor)
    }

    /// Byte size of an entry, following typedefs and qualifiers.
    fn type_size(
        &self,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        depth: usize,
    ) -> Result<Option<u64>>
    {
        if let Some(attr) = entry
            .attr(constants::DW_AT_byte_size)
            .map_err(|err| map_dwarf_error("reading DW_AT_byte_size", err))?
        {
            return Ok(attr.udata_value());
        }
        if depth >= MAX_TYPE_REF_DEPTH {
            return Ok(None);
        }
        let Some(attr) = entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
        else {
            return Ok(None);
        };
        match self.referenced_entry(unit, attr.value())? {
            Some((target_unit, offset)) => {
                let target = target_unit
                    .entry(offset)
                    .map_err(|err| map_dwarf_error("resolving type reference", err))?;
                self.type_size(target_unit, &target, depth + 1)
            }
            None => Ok(None),
        }
    }

    fn collect_members(&self, unit: &Unit<OwnedReader>, offset: UnitOffset<usize>) -> Result<Vec<TypeMember>>
    {
        let mut members = Vec::new();
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| map_dwarf_error("building member tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating member root", err))?;
        let mut children = root.children();
        while let Some(child) = children.next().map_err(|err| map_dwarf_error("iterating members", err))? {
            let entry = child.entry();
            if entry.tag() != constants::DW_TAG_member {
                continue;
            }
            let type_name = match entry
                .attr(constants::DW_AT_type)
                .map_err(|err| map_dwarf_error("reading member type", err))?
            {
                Some(attr) => self.resolve_type_name(unit, attr.value(), 0)?,
                None => None,
            };
            members.push(TypeMember {
                name: self.entry_name(unit, entry)?,
                type_name,
                bit_offset: self.member_bit_offset(entry)?,
            });
        }
        Ok(members)
    }

    fn member_bit_offset(&self, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> Result<Option<u64>>
    {
        if let Some(attr) = entry
            .attr(constants::DW_AT_data_bit_offset)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_bit_offset", err))?
        {
            if let Some(bits) = attr.udata_value() {
                return Ok(Some(bits));
            }
        }
        if let Some(attr) = entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
        {
            if let Some(bytes) = attr.udata_value() {
                return Ok(bytes.checked_mul(8));
            }
        }
        Ok(None)
    }

    fn collect_enumerators(&self, unit: &Unit<OwnedReader>, offset: UnitOffset<usize>) -> Result<Vec<Enumerator>>
    {
        let mut enumerators = Vec::new();
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| map_dwarf_error("building enumeration tree", err))?;
        let root = tree
            .root()
            .map_err(|err| map_dwarf_error("navigating enumeration root", err))?;
        let mut children = root.children();
        while let Some(child) = children.next().map_err(|err| map_dwarf_error("iterating enumerators", err))? {
            let entry = child.entry();
            if entry.tag() != constants::DW_TAG_enumerator {
                continue;
            }
            let (Some(name), Some(attr)) = (
                self.entry_name(unit, entry)?,
                entry
                    .attr(constants::DW_AT_const_value)
                    .map_err(|err| map_dwarf_error("reading DW_AT_const_value", err))?,
            ) else {
                continue;
            };
            #[allow(clippy::cast_possible_wrap)]
            let value = attr
                .sdata_value()
                .or_else(|| attr.udata_value().map(|value| value as i64));
            if let Some(value) = value {
                enumerators.push(Enumerator { name, value });
            }
        }
        Ok(enumerators)
    }

    fn entry_name(
        &self,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
    ) -> Result<Option<String>>
    {
        match entry
            .attr(constants::DW_AT_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
        {
            Some(attr) => self.attr_to_string(unit, attr.value()).map(Some),
            None => Ok(None),
        }
    }

    fn attr_to_string(&self, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> Result<String>
    {
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(owned)
    }

    /// Locate the entry a type reference points to.
    fn referenced_entry<'u>(
        &'u self,
        unit: &'u Unit<OwnedReader>,
        value: AttributeValue<OwnedReader>,
    ) -> Result<Option<(&'u Unit<OwnedReader>, UnitOffset<usize>)>>
    {
        Ok(match value {
            AttributeValue::UnitRef(offset) => Some((unit, offset)),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::from(offset);
                self.units
                    .iter()
                    .find_map(|candidate| target.to_unit_offset(candidate).map(|offset| (candidate, offset)))
            }
            _ => None,
        })
    }

    /// C-style name of a referenced type: `int`, `struct list_head *`.
    fn resolve_type_name(
        &self,
        unit: &Unit<OwnedReader>,
        value: AttributeValue<OwnedReader>,
        depth: usize,
    ) -> Result<Option<String>>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Ok(None);
        }
        let Some((target_unit, offset)) = self.referenced_entry(unit, value)? else {
            return Ok(None);
        };
        let die = target_unit
            .entry(offset)
            .map_err(|err| map_dwarf_error("resolving type reference", err))?;
        let inner = match die
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading nested type", err))?
        {
            Some(attr) => self.resolve_type_name(target_unit, attr.value(), depth + 1)?,
            None => None,
        };
        let name = self.entry_name(target_unit, &die)?;
        Ok(match die.tag() {
            constants::DW_TAG_pointer_type => Some(format!("{} *", inner.as_deref().unwrap_or("void"))),
            constants::DW_TAG_const_type => Some(format!("const {}", inner.as_deref().unwrap_or("void"))),
            constants::DW_TAG_volatile_type => Some(format!("volatile {}", inner.as_deref().unwrap_or("void"))),
            constants::DW_TAG_array_type => inner.map(|inner| format!("{inner} []")),
            constants::DW_TAG_structure_type => name.map(|name| format!("struct {name}")),
            constants::DW_TAG_union_type => name.map(|name| format!("union {name}")),
            constants::DW_TAG_enumeration_type => name.map(|name| format!("enum {name}")),
            _ => name.or(inner),
        })
    }
}
