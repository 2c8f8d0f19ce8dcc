//! Tests for live targets, driven through a fake procfs

mod common;

use common::{CoreBuilder, FakeProc};
use kestrel_core::program::{Program, ProgramFlags};
use kestrel_core::types::{Address, ProcessId};
use kestrel_core::KestrelError;

const RELEASE: &str = "OSRELEASE=0.0.0-kestrel-test\nKERNELOFFSET=0\n";

#[test]
fn test_live_kernel_from_kcore()
{
    let proc = FakeProc::new();
    proc.write(
        "kcore",
        &CoreBuilder::host()
            .vmcoreinfo(RELEASE)
            .load(0x1000_0000, b"kernel text")
            .build(),
    );

    let program = Program::from_kernel(&proc.config()).unwrap();
    assert!(program.is_kernel());
    assert!(program.is_live());
    assert_eq!(program.flags(), ProgramFlags::IS_LINUX_KERNEL | ProgramFlags::IS_LIVE);
    assert_eq!(program.osrelease(), "0.0.0-kestrel-test");
    assert_eq!(program.kaslr_offset(), 0);
    assert_eq!(program.read(Address::new(0x1000_0007), 4).unwrap(), b"text");
}

#[test]
fn test_live_kernel_falls_back_to_kallsyms()
{
    let proc = FakeProc::new();
    proc.write("kcore", &CoreBuilder::host().vmcoreinfo(RELEASE).build());
    proc.write(
        "kallsyms",
        b"0000000081000000 T _text\n0000000081000100 t helper\t[module]\n(null) A fixed_percpu_data\n",
    );

    let program = Program::from_kernel(&proc.config()).unwrap();
    assert_eq!(program.symbol_count(), 3);
    assert_eq!(program.find_symbol("_text").unwrap().address, 0x8100_0000);
    assert_eq!(program.symbol_at(Address::new(0x8100_0100)).unwrap().name, "helper");
    assert_eq!(program.find_symbol("fixed_percpu_data").unwrap().address, 0);
}

#[test]
fn test_unreadable_kallsyms_is_tolerated()
{
    let proc = FakeProc::new();
    proc.write("kcore", &CoreBuilder::host().vmcoreinfo(RELEASE).build());
    proc.write("kallsyms", b"not a symbol listing\n");

    let program = Program::from_kernel(&proc.config()).unwrap();
    assert_eq!(program.symbol_count(), 0);
}

#[test]
fn test_missing_kcore_is_target_not_found()
{
    let proc = FakeProc::new();
    let err = Program::from_kernel(&proc.config()).unwrap_err();
    assert!(matches!(err, KestrelError::TargetNotFound(_)), "{err}");
}

#[test]
fn test_kcore_without_vmcoreinfo_is_malformed()
{
    let proc = FakeProc::new();
    proc.write("kcore", &CoreBuilder::host().load(0x1000, &[0; 8]).build());
    let err = Program::from_kernel(&proc.config()).unwrap_err();
    assert!(err.is_malformed(), "{err}");
}

fn fake_process(proc: &FakeProc, pid: u32, maps: &str)
{
    proc.write(&format!("{pid}/maps"), maps.as_bytes());
    let mem: Vec<u8> = (0..0x3000u32).map(|i| (i % 251) as u8).collect();
    proc.write(&format!("{pid}/mem"), &mem);
}

#[test]
fn test_live_process()
{
    let proc = FakeProc::new();
    fake_process(
        &proc,
        4242,
        "\
00001000-00002000 r-xp 00000000 08:01 1234                       /nonexistent/app
00002000-00003000 rw-p 00001000 08:01 1234                       /nonexistent/app
00003000-00004000 rw-p 00000000 00:00 0                          [heap]
7ffd0000-7ffd1000 rw-p 00000000 00:00 0
",
    );

    let program = Program::from_pid(ProcessId(4242), &proc.config()).unwrap();
    assert!(!program.is_kernel());
    assert!(program.is_live());
    assert_eq!(program.flags(), ProgramFlags::IS_LIVE);
    assert_eq!(program.mappings().len(), 2);
    assert_eq!(
        program.mapping_for_address(Address::new(0x2010)).unwrap().file_offset,
        0x1010
    );
    assert!(program.mapping_for_address(Address::new(0x3000)).is_none());

    // mem is indexed by address
    assert_eq!(program.read(Address::new(0x1000), 2).unwrap(), [(0x1000 % 251) as u8, (0x1001 % 251) as u8]);
    assert!(matches!(
        program.read(Address::new(0x5000), 1),
        Err(KestrelError::Fault { address: 0x5000 })
    ));
}

#[test]
fn test_missing_process_is_process_not_found()
{
    let proc = FakeProc::new();
    let err = Program::from_pid(ProcessId(999_999), &proc.config()).unwrap_err();
    assert!(matches!(err, KestrelError::ProcessNotFound(999_999)), "{err}");
}

#[test]
fn test_garbled_maps_is_malformed()
{
    let proc = FakeProc::new();
    fake_process(&proc, 7, "this-is not a maps line at all\n");
    let err = Program::from_pid(ProcessId(7), &proc.config()).unwrap_err();
    assert!(err.is_malformed(), "{err}");
}

#[cfg(target_os = "linux")]
#[test]
fn test_reads_own_memory()
{
    use kestrel_core::program::ProgramConfig;

    static MARKER: [u8; 8] = *b"kestrel!";

    let program = Program::from_pid(ProcessId(std::process::id()), &ProgramConfig::default()).unwrap();
    let address = Address::new(MARKER.as_ptr() as u64);
    assert_eq!(program.read(address, MARKER.len()).unwrap(), MARKER);
    assert!(program.mapping_for_address(address).is_some());
}
