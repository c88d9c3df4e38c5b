mod common;

use common::{Dump, list_head};
use ramscope::reports::{DirSink, Outcome, all_reports, find_report, run_reports};
use serde_json::json;
use std::fs;

/// A 5.10 kernel with two modules and three devices. No vmap areas or super blocks.
fn dump() -> Dump {
    let mut d = Dump::new(0x10000);

    let modules = d.alloc(16);
    d.symbol("modules", modules);
    let mut links = Vec::new();
    for (name, base, size) in [("wlan", 0xffff_ffc0_0900_0000u64, 0x3c1000u64), ("kgsl", 0xffff_ffc0_0800_0000, 0xa3000)] {
        let module = d.alloc(0x100);
        d.put_str(module + 0x18, name);
        d.put_u64(module + 0x60, base);
        d.put_u64(module + 0x68, size);
        links.push(module + 8);
    }
    d.link(modules, &links);

    let slot = d.alloc(8);
    let kset = d.alloc(0x40);
    d.symbol("devices_kset", slot);
    d.put_u64(slot, kset);
    let mut links = Vec::new();
    for name in ["platform", "soc", "cpu"] {
        let kobj = d.alloc(0x40);
        let text = d.alloc(16);
        d.put_str(text, name);
        d.put_u64(kobj, text);
        links.push(kobj + 8);
    }
    d.link(kset, &links);
    d
}

fn metadata() -> serde_json::Value {
    json!({
        "kernel_version": "5.10.66",
        "types": {
            "struct list_head": list_head(),
            "struct module": {
                "size": 256,
                "fields": {
                    "list": {"offset": 8, "size": 16, "type": "struct list_head"},
                    "name": {"offset": 24, "size": 56},
                    "core_layout": {"offset": 96, "size": 64, "type": "struct module_layout"}
                }
            },
            "struct module_layout": {
                "size": 64,
                "fields": {
                    "base": {"offset": 0, "size": 8},
                    "size": {"offset": 8, "size": 4}
                }
            },
            "struct kset": {
                "size": 64,
                "fields": {"list": {"offset": 0, "size": 16, "type": "struct list_head"}}
            },
            "struct kobject": {
                "size": 64,
                "fields": {
                    "name": {"offset": 0, "size": 8},
                    "entry": {"offset": 8, "size": 16, "type": "struct list_head"}
                }
            }
        }
    })
}

#[test]
fn reports_land_in_the_output_directory() {
    let d = dump();
    let session = d.session(&metadata());
    let out = d.dir.path().join("reports");
    let sink = DirSink::new(&out).unwrap();

    let reports = [find_report("modules").unwrap(), find_report("devices").unwrap()];
    let results = run_reports(&session, &reports, &sink, true);
    assert!(results.iter().all(|r| r.is_written()), "{results:?}");

    let modules = fs::read_to_string(out.join("modules.txt")).unwrap();
    let names: Vec<_> = modules.lines().skip(2).filter_map(|l| l.split_whitespace().next()).collect();
    assert_eq!(names, ["kgsl", "wlan"]);

    let devices = fs::read_to_string(out.join("devices.txt")).unwrap();
    let names: Vec<_> = devices.lines().skip(2).filter_map(|l| l.split_whitespace().last()).collect();
    assert_eq!(names, ["platform", "soc", "cpu"]);
}

#[test]
fn missing_pieces_only_affect_their_own_report() {
    let d = dump();
    let session = d.session(&metadata());
    let out = d.dir.path().join("all");
    let sink = DirSink::new(&out).unwrap();

    let results = run_reports(&session, all_reports(), &sink, false);
    let outcome = |name: &str| &results.iter().find(|r| r.name == name).unwrap().outcome;
    assert!(matches!(outcome("modules"), Outcome::Written));
    assert!(matches!(outcome("devices"), Outcome::Written));
    assert!(matches!(outcome("vmalloc"), Outcome::Failed(_)));
    assert!(matches!(outcome("pagecache"), Outcome::Failed(_)));
    assert!(matches!(outcome("tasks"), Outcome::Failed(_)));
    assert!(matches!(outcome("pids"), Outcome::Skipped(_)));
    assert!(!out.join("vmalloc.txt").exists());
}
