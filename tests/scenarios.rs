//! End-to-end runs through the public API: assemble (or convert), write the
//! image to bytes, read it back, load it, and execute.

use lc3_forge::asm::bin::BinConverter;
use lc3_forge::asm::obj::ObjectFile;
use lc3_forge::asm::Assembler;
use lc3_forge::isa::reg_consts::{R0, R1, R2};
use lc3_forge::log::{BufferedPrinter, Logger, NullPrinter};
use lc3_forge::sim::debug::Breakpoint;
use lc3_forge::sim::frame::CallbackType;
use lc3_forge::sim::io::{BufferedInputter, NoInput};
use lc3_forge::sim::{SimFlags, Simulator};

fn assemble(src: &str) -> ObjectFile {
    let mut asm = Assembler::new(Logger::new(NullPrinter, 0), false);
    asm.assemble(src).unwrap()
}

fn roundtrip(obj: ObjectFile) -> ObjectFile {
    ObjectFile::deserialize(&obj.serialize()).unwrap()
}

#[test]
fn assembled_image_survives_disk_roundtrip_and_runs() {
    let obj = roundtrip(assemble(
        "
        .orig x3000
        ADD R1, R2, #-1
        .end
        ",
    ));

    let mut sim = Simulator::new(SimFlags::default(), NullPrinter, NoInput);
    sim.state.reg_file[R2] = 5;
    sim.load_obj_file(&obj);

    assert_eq!(sim.state.mem_loc(0x3000).value, 0x12BF);
    assert_eq!(sim.state.mem_loc(0x3000).line.trim(), "ADD R1, R2, #-1");

    sim.run_with_limit(1);
    assert_eq!(sim.state.reg_file[R1], 4);
}

#[test]
fn binary_listing_loads_first_word_as_origin_and_data() {
    let conv = BinConverter::new(Logger::new(NullPrinter, 0));
    let obj = roundtrip(
        conv.convert_bin("0011000000000000\n1111000000100101\n")
            .unwrap(),
    );

    let mut sim = Simulator::new(SimFlags::default(), NullPrinter, NoInput);
    sim.load_obj_file(&obj);

    assert_eq!(sim.state.mem_loc(0x3000).value, 0x3000);
    assert_eq!(sim.state.mem_loc(0x3001).value, 0xF025);
}

#[test]
fn load_negative_fill_sets_condition_codes() {
    let obj = roundtrip(assemble(
        "
        .orig x3000
        LD R0, X
        X .fill #-2
        .end
        ",
    ));

    let mut sim = Simulator::new(SimFlags::default(), NullPrinter, NoInput);
    sim.load_obj_file(&obj);
    sim.run_with_limit(1);

    assert_eq!(sim.state.reg_file[R0], 0xFFFE);
    assert_eq!(sim.state.psr().cc(), 0b100);
}

#[test]
fn keyboard_ready_data_and_clear() {
    let inputter = BufferedInputter::new();
    inputter.get_buffer().write().unwrap().push_back(b'A');

    let mut sim = Simulator::new(
        SimFlags { ignore_privilege: true, ..Default::default() },
        NullPrinter,
        inputter,
    );
    sim.load_obj_file(&assemble(".orig x3000\nADD R0, R0, #1\n.end"));
    sim.run_with_limit(1);

    let (kbsr, _) = sim.state.read_mem(0xFE00).unwrap();
    assert_eq!(kbsr & 0x8000, 0x8000);

    let (kbdr, _) = sim.state.read_mem(0xFE02).unwrap();
    assert_eq!(kbdr, 0x41);

    let (kbsr, _) = sim.state.read_mem(0xFE00).unwrap();
    assert_eq!(kbsr & 0x8000, 0);
}

#[test]
fn halting_program_prints_its_output_only() {
    let printer = BufferedPrinter::new();
    let mut sim = Simulator::new(
        SimFlags { print_level: 0, ..Default::default() },
        printer.clone(),
        NoInput,
    );
    sim.load_obj_file(&assemble(
        "
        .orig x3000
        LEA R0, MSG
        PUTS
        HALT
        MSG .stringz \"Hi\"
        .end
        ",
    ));

    sim.run();
    assert!(!sim.state.running());
    assert_eq!(printer.contents(), "Hi");
}

#[test]
fn breakpoint_suspends_then_resumes_past_it() {
    let mut sim = Simulator::new(SimFlags::default(), NullPrinter, NoInput);
    sim.load_obj_file(&assemble(
        "
        .orig x3000
        ADD R0, R0, #1
        ADD R0, R0, #1
        ADD R0, R0, #1
        HALT
        .end
        ",
    ));
    sim.breakpoints.insert(Breakpoint::Pc(0x3002));

    let hits = std::sync::Arc::new(std::sync::Mutex::new(0u32));
    {
        let hits = std::sync::Arc::clone(&hits);
        sim.register_callback(CallbackType::Breakpoint, move |_, _| {
            *hits.lock().unwrap() += 1;
        });
    }

    sim.run();
    assert_eq!(*hits.lock().unwrap(), 1);
    assert_eq!(sim.state.pc, 0x3002);
    assert_eq!(sim.inst_count_this_run(), 2);

    sim.run();
    assert!(!sim.state.running());
    assert_eq!(*hits.lock().unwrap(), 1);
    assert_eq!(sim.state.reg_file[R0], 3);
}
