//! Tests for mock programs: memory, symbols, types, and kind-specific metadata

use kestrel_core::metadata::FileMapping;
use kestrel_core::program::{MockSegment, MockTarget, Program, ProgramFlags};
use kestrel_core::symbols::Symbol;
use kestrel_core::type_index::{TypeDescriptor, TypeKind};
use kestrel_core::types::Address;
use kestrel_core::KestrelError;

fn userspace() -> Program
{
    let mappings = vec![
        FileMapping::new("/usr/lib/libc.so.6", 0x7f00_0000_0000, 0x7f00_0002_0000, 0).unwrap(),
        FileMapping::new("/usr/bin/app", 0x40_0000, 0x40_1000, 0).unwrap(),
        FileMapping::new("/usr/bin/app", 0x40_1000, 0x40_3000, 0x1000).unwrap(),
    ];
    Program::from_mock(MockTarget::new(8, true).with_mappings(mappings)).unwrap()
}

fn kernel() -> Program
{
    Program::from_mock(
        MockTarget::new(8, true)
            .kernel("6.1.0-13-amd64", 0x1e00_0000)
            .with_symbol(Symbol::new("init_task", 0xffff_ffff_8200_0000, 0x1000)),
    )
    .unwrap()
}

#[test]
fn test_word_size_and_byte_order()
{
    let narrow = Program::from_mock(MockTarget::new(4, false)).unwrap();
    assert_eq!(narrow.word_size(), 4);
    assert!(!narrow.is_little_endian());
    assert_eq!(narrow.word_mask(), 0xffff_ffff);

    let wide = Program::from_mock(MockTarget::new(8, true)).unwrap();
    assert_eq!(wide.word_size(), 8);
    assert!(wide.is_little_endian());
    assert_eq!(wide.word_mask(), u64::MAX);
}

#[test]
fn test_rejects_unsupported_word_size()
{
    for size in [0, 1, 2, 3, 5, 16] {
        let err = Program::from_mock(MockTarget::new(size, true)).unwrap_err();
        assert!(err.is_malformed(), "word size {size}: {err}");
    }
}

#[test]
fn test_default_mock_is_userspace_without_mappings()
{
    let program = Program::from_mock(MockTarget::new(8, true)).unwrap();
    assert!(!program.is_kernel());
    assert!(!program.is_live());
    assert_eq!(program.flags(), ProgramFlags::empty());
    assert!(program.mappings().is_empty());
    assert!(program.kernel_info().is_none());
}

#[test]
fn test_reads_span_segments()
{
    let program = Program::from_mock(
        MockTarget::new(8, true)
            .with_segment(MockSegment::new(0x1000, vec![1, 2, 3, 4]))
            .with_segment(MockSegment::new(0x1004, vec![5, 6, 7, 8])),
    )
    .unwrap();
    assert_eq!(program.read(Address::new(0x1002), 4).unwrap(), [3, 4, 5, 6]);
    assert_eq!(program.read_word(Address::new(0x1000)).unwrap(), 0x0807_0605_0403_0201);
}

#[test]
fn test_nested_segments_read_through()
{
    let program = Program::from_mock(
        MockTarget::new(8, true)
            .with_segment(MockSegment::new(0x1000, vec![0xaa; 0x100]))
            .with_segment(MockSegment::new(0x1010, vec![0xbb; 0x10])),
    )
    .unwrap();
    assert_eq!(program.read(Address::new(0x1018), 1).unwrap(), [0xbb]);
    assert_eq!(program.read(Address::new(0x1080), 1).unwrap(), [0xaa]);
    assert_eq!(program.read(Address::new(0x101e), 4).unwrap(), [0xbb, 0xbb, 0xaa, 0xaa]);
}

#[test]
fn test_read_outside_segments_faults()
{
    let program =
        Program::from_mock(MockTarget::new(8, true).with_segment(MockSegment::new(0x1000, vec![0; 8]))).unwrap();
    let err = program.read(Address::new(0x1004), 8).unwrap_err();
    assert!(matches!(err, KestrelError::Fault { address: 0x1008 }));
    assert!(matches!(
        program.read(Address::new(0x2000), 1),
        Err(KestrelError::Fault { address: 0x2000 })
    ));
}

#[test]
fn test_big_endian_words()
{
    let program = Program::from_mock(
        MockTarget::new(4, false).with_segment(MockSegment::new(0x10, vec![0xde, 0xad, 0xbe, 0xef])),
    )
    .unwrap();
    assert_eq!(program.read_word(Address::new(0x10)).unwrap(), 0xdead_beef);
}

#[test]
fn test_narrow_target_wraps_addresses()
{
    let program = Program::from_mock(
        MockTarget::new(4, true)
            .with_segment(MockSegment::new(0xffff_fffe, vec![0xaa, 0xbb]))
            .with_segment(MockSegment::new(0, vec![0xcc, 0xdd])),
    )
    .unwrap();
    // Reads past the top of a 32-bit space continue at zero
    assert_eq!(program.read(Address::new(0xffff_fffe), 4).unwrap(), [0xaa, 0xbb, 0xcc, 0xdd]);
    // Bits above the word width are ignored
    assert_eq!(program.read(Address::new(0x1_0000_0000), 2).unwrap(), [0xcc, 0xdd]);
}

#[test]
fn test_segment_past_address_space_is_malformed()
{
    let err =
        Program::from_mock(MockTarget::new(4, true).with_segment(MockSegment::new(0xffff_ffff, vec![0; 2]))).unwrap_err();
    assert!(err.is_malformed());
}

#[test]
fn test_mapping_lookup()
{
    let program = userspace();
    assert_eq!(program.mappings().len(), 3);
    assert_eq!(program.mappings()[0].start(), Address::new(0x40_0000));

    let hit = program.mapping_for_address(Address::new(0x40_1800)).unwrap();
    assert_eq!(hit.mapping.path(), "/usr/bin/app");
    assert_eq!(hit.offset, 0x800);
    assert_eq!(hit.file_offset, 0x1800);

    assert!(program.mapping_for_address(Address::new(0x3f_ffff)).is_none());
    assert!(program.mapping_for_address(Address::new(0x40_3000)).is_none());
    assert!(program.mapping_for_address(Address::new(0x7f00_0001_0000)).is_some());
}

#[test]
fn test_kernel_metadata()
{
    let program = kernel();
    assert!(program.is_kernel());
    assert!(!program.is_live());
    assert_eq!(program.osrelease(), "6.1.0-13-amd64");
    assert_eq!(program.kaslr_offset(), 0x1e00_0000);
    assert_eq!(program.kernel_address(0xffff_ffff_8100_0000), 0xffff_ffff_9f00_0000);
    assert!(program.process_mappings().is_none());
}

#[test]
fn test_kernel_symbols_are_shifted_by_kaslr()
{
    let program = kernel();
    let symbol = program.find_symbol("init_task").unwrap();
    assert_eq!(symbol.address, 0xffff_ffff_a000_0000);
    let found = program.symbol_at(Address::new(0xffff_ffff_a000_0010)).unwrap();
    assert_eq!(found.name, "init_task");
}

#[test]
#[should_panic(expected = "userspace program")]
fn test_osrelease_panics_on_userspace()
{
    let _ = userspace().osrelease();
}

#[test]
#[should_panic(expected = "userspace program")]
fn test_kaslr_offset_panics_on_userspace()
{
    let _ = userspace().kaslr_offset();
}

#[test]
#[should_panic(expected = "kernel program")]
fn test_mappings_panics_on_kernel()
{
    let _ = kernel().mappings().len();
}

#[test]
#[should_panic(expected = "kernel program")]
fn test_mapping_for_address_panics_on_kernel()
{
    let _ = kernel().mapping_for_address(Address::new(0)).is_some();
}

#[test]
fn test_symbols()
{
    let program = Program::from_mock(
        MockTarget::new(8, true)
            .with_symbol(Symbol::new("main", 0x1000, 0x40))
            .with_symbol(Symbol::new("helper", 0x1040, 0x10)),
    )
    .unwrap();
    assert_eq!(program.symbol_count(), 2);
    assert_eq!(program.find_symbol("helper").unwrap().address, 0x1040);
    assert!(program.find_symbol("missing").is_none());
    assert_eq!(program.symbol_at(Address::new(0x103f)).unwrap().name, "main");
    assert_eq!(program.symbol_at(Address::new(0x1040)).unwrap().name, "helper");
    assert!(program.symbol_at(Address::new(0x1050)).is_none());
}

#[test]
fn test_types()
{
    let program = Program::from_mock(
        MockTarget::new(8, true)
            .with_type(TypeDescriptor::new("int", TypeKind::Int, Some(4)))
            .with_type(
                TypeDescriptor::new("list_head", TypeKind::Struct, Some(16))
                    .with_member("next", "struct list_head *", 0)
                    .with_member("prev", "struct list_head *", 64),
            )
            .with_type(TypeDescriptor::new("pid_t", TypeKind::Typedef, Some(4))),
    )
    .unwrap();

    assert_eq!(program.find_type("int").unwrap().unwrap().size, Some(4));
    let list = program.find_type("struct list_head").unwrap().unwrap();
    assert_eq!(list.members.len(), 2);
    assert_eq!(list.display_name(), "struct list_head");
    // A bare name falls back to the tag
    assert_eq!(program.find_type("list_head").unwrap().unwrap().kind, TypeKind::Struct);
    // The keyword restricts the kind
    assert!(program.find_type("union list_head").unwrap().is_none());
    assert!(program.find_type("struct pid_t").unwrap().is_none());
    assert!(program.find_type("long").unwrap().is_none());
}

#[test]
fn test_empty_mock_is_valid()
{
    let program = Program::from_mock(MockTarget::new(8, true)).unwrap();
    assert!(matches!(
        program.read(Address::new(0), 1),
        Err(KestrelError::Fault { address: 0 })
    ));
    assert!(program.read_word(Address::new(0xffff_ffff_ffff_fff8)).is_err());
    assert_eq!(program.symbol_count(), 0);
    assert!(program.symbol_at(Address::new(0x1000)).is_none());
    assert!(program.find_symbol("main").is_none());
    assert!(program.find_type("int").unwrap().is_none());
    assert!(program.mapping_for_address(Address::new(0x1000)).is_none());
    // An empty read touches nothing
    assert!(program.read(Address::new(0x1000), 0).unwrap().is_empty());
}

#[test]
fn test_program_is_send()
{
    fn assert_send<T: Send>(_: &T) {}
    assert_send(&Program::from_mock(MockTarget::new(8, true)).unwrap());
}
