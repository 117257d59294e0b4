use std::collections::HashSet;

use vela_lang::compiler::{compile, Compilation, CompileErr, CompileOptions, OptionErr, Source};
use vela_lang::display::IrListing;
use vela_lang::err::ErrKind;
use vela_lang::ir::Instr;
use vela_lang::semantic::symbols::{ActnId, VarKind};
use vela_lang::semantic::SemErr;

fn compile_files(files: &[&str]) -> Compilation {
    let sources: Vec<_> = files.iter()
        .map(|f| Source::read(format!("tests/files/{f}")).unwrap())
        .collect();

    match compile(&sources, &CompileOptions::default()) {
        Ok(c) => c,
        Err(e) => panic!("{}", e.short_msg()),
    }
}

/// Stack depth after each instruction, checking it never underflows and is empty at every `Ret`.
fn depths(out: &Compilation, actn: ActnId) -> Vec<isize> {
    let mut depth = 0;
    out.ir[&actn].iter()
        .map(|i| {
            depth += i.stack_delta(&out.symbols, actn);
            assert!(depth >= 0, "stack underflow at {i:?}");
            if *i == Instr::Ret {
                assert_eq!(depth, 0, "stack not empty at return");
            }
            depth
        })
        .collect()
}

#[test]
fn hello_world() {
    let out = compile_files(&["hello.vela"]);
    let listing = IrListing { table: &out.symbols, ir: &out.ir }.to_string();

    let global = out.symbols.ty(out.symbols.global);
    let cctor = global.methods[".cctor"][0];
    assert_eq!(depths(&out, cctor), [1, 0, 0]);
    assert_eq!(depths(&out, out.entry), [0]);

    assert!(listing.contains(concat!(
        ".method static <global>::.cctor()\n",
        "    ldlit \"Hello, World!\"\n",
        "    call System.Console::WriteLine(System.String)\n",
        "    ret\n",
    )), "{listing}");
}

#[test]
fn sources_share_declarations() {
    let out = compile_files(&["shapes.vela", "main.vela"]);
    let main = out.symbols.actn(out.entry);
    assert_eq!(main.name, "main");

    let rect = out.symbols.app_types["Rect"];
    assert_eq!(out.symbols.ty(rect).base, Some(out.symbols.app_types["Shape"]));
    assert!(out.symbols.external_refs.iter().any(|&t| out.symbols.ty(t).name == "System.Text.StringBuilder"));
}

#[test]
fn arrays_round_trip() {
    let out = compile_files(&["shapes.vela", "main.vela"]);
    let ir = &out.ir[&out.entry];

    assert!(ir.iter().any(|i| matches!(i, Instr::NewArray(_))));
    assert!(ir.iter().any(|i| matches!(i, Instr::StoreElem(_))));
    assert!(ir.iter().any(|i| matches!(i, Instr::LoadElem(_))));
}

#[test]
fn chained_assignment_uses_temp() {
    let out = compile_files(&["shapes.vela", "main.vela"]);
    let main = out.symbols.actn(out.entry);

    assert!(main.locals.iter().any(|&v| out.symbols.var(v).kind == VarKind::Temp));
}

#[test]
fn labels_are_unique() {
    let out = compile_files(&["shapes.vela", "main.vela"]);

    let mut seen = HashSet::new();
    for instrs in out.ir.values() {
        for i in instrs {
            if let Instr::PutLabel(l) = i {
                assert!(seen.insert(l.to_string()), "label {l} placed twice");
            }
        }
    }
    assert!(seen.len() >= 5);
}

#[test]
fn bodies_keep_the_stack_balanced() {
    let out = compile_files(&["shapes.vela", "main.vela"]);
    for &actn in out.ir.keys() {
        depths(&out, actn);
    }
}

#[test]
fn overloads_by_argument_type() {
    let out = compile_files(&["shapes.vela", "main.vela"]);
    let listing = IrListing { table: &out.symbols, ir: &out.ir }.to_string();

    assert!(listing.contains("call <global>::show(System.Int32)"), "{listing}");
    assert!(listing.contains("call <global>::show(System.String)"), "{listing}");
    assert!(listing.contains("call System.Text.StringBuilder::Append(System.Int32)"), "{listing}");
}

#[test]
fn redeclared_across_sources() {
    let sources = [
        Source::new("a.vela", "class Point end"),
        Source::new("b.vela", "class Point end"),
    ];
    let err = compile(&sources, &CompileOptions::default()).unwrap_err();

    assert_eq!(err.kind(), ErrKind::Semantic);
    assert_eq!(*err.err(), CompileErr::Sem(SemErr::DuplicateType("Point".to_string())));
    assert_eq!(err.loc().map(|l| &*l.path), Some("b.vela"));
}

#[test]
fn error_messages_point_at_source() {
    let src = "fun main()\n    a <- nope\nend";
    let err = compile(&[Source::new("m.vela", src)], &CompileOptions::default()).unwrap_err();

    assert_eq!(err.full_msg(src), [
        "m.vela:2:10 :: syntax error: 'nope' is not defined",
        "",
        "    a <- nope",
        "         ^",
    ].join("\n"));
}

#[test]
fn options_are_checked() {
    assert_eq!(
        CompileOptions::from_pairs([("verbose", "1")]),
        Err(OptionErr::Unknown("verbose".to_string()))
    );

    let opts = CompileOptions::from_pairs([("out", "hello.exe"), ("xxx-dump-ir", "")]).unwrap();
    let out = compile(&[Source::new("h.vela", "`p(1)")], &opts).unwrap();
    assert_eq!(out.out.as_deref(), Some(std::path::Path::new("hello.exe")));
    assert!(out.flags.contains_key("xxx-dump-ir"));
}
