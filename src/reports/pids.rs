use super::tables::{TableBuilder, add_field};
use super::{Report, Session, write_problems};
use crate::debug::{KernelVersion, VersionRange};
use crate::error::{Error, Result};
use crate::memory::offset_addr;
use crate::walk::{HlistWalker, Walk};
use std::io::Write;
use std::ops::ControlFlow;

/// Anything bigger than this is a garbage `pidhash_shift`.
const MAX_PIDHASH_SHIFT: u32 = 16;

/// The pid hash table that 4.15 replaced with an idr.
pub struct Pids;

struct Pid {
    nr: i32,
    ns: u64,
    bucket: u64,
    upid: u64,
}

impl Report for Pids {
    fn name(&self) -> &'static str {
        "pids"
    }

    fn description(&self) -> &'static str {
        "pid numbers hashed in pid_hash, by namespace"
    }

    fn supported(&self) -> VersionRange {
        VersionRange::before(KernelVersion::new(4, 15, 0))
    }

    fn generate(&self, session: &Session, out: &mut dyn Write) -> Result<()> {
        let table = session.space.read_pointer(session.symbol("pid_hash")?)?;
        let shift = session.space.read_u32(session.symbol("pidhash_shift")?)?;
        if shift > MAX_PIDHASH_SHIFT {
            return Err(Error::corrupt(table, format!("pidhash_shift is {shift}")));
        }
        let link = session.types.field_offset("struct upid", "pid_chain")?;
        let head_size = session.pointer_size() as u64;

        let mut pids = Vec::new();
        let mut skipped = Vec::new();
        let mut walk = Walk::new();
        for bucket in 0..1u64 << shift {
            let head = offset_addr(table, bucket * head_size)?;
            let chain = HlistWalker::new(&session.space, head, link)
                .layout(session.hlist_layout())
                .validate(true)
                .limits(session.limits())
                .walk(|upid| {
                    let view = session.view(upid, "struct upid");
                    match view.get_u32("nr").and_then(|nr| Ok((nr, view.get_pointer("ns")?))) {
                        Ok((nr, ns)) => pids.push(Pid {
                            nr: nr as i32,
                            ns,
                            bucket,
                            upid,
                        }),
                        Err(err) => skipped.push(Error::corrupt(upid, format!("skipped upid: {err}"))),
                    }
                    ControlFlow::Continue(())
                });
            walk.absorb(chain);
            if session.is_aborted() {
                break;
            }
        }
        pids.sort_by_key(|p| (p.ns, p.nr));

        let mut builder = TableBuilder::new();
        builder.add_col_r("nr", "pid number as seen in its namespace");
        builder.add_col_r("ns", "address of the struct pid_namespace");
        builder.add_col_r("bucket", "pid_hash bucket the upid was found in");
        builder.add_col_r("upid", "address of the struct upid");
        for p in &pids {
            add_field!(builder, "nr", p.nr);
            add_field!(builder, "ns", "{:x}", p.ns);
            add_field!(builder, "bucket", p.bucket);
            add_field!(builder, "upid", "{:x}", p.upid);
        }
        builder.write(out, true, session.explain)?;
        write_problems(out, "pid_hash", &walk, &skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::TypeDescriptor;
    use crate::reports::testing::Kernel;
    use crate::reports::{MemorySink, Outcome, run_report};

    const V4_14: KernelVersion = KernelVersion::new(4, 14, 0);
    const INIT_NS: u64 = 0xffff_ffc0_1200_0000;

    /// Four buckets holding `(bucket, nr)` upids, returning the kernel and the upids.
    fn kernel(pids: &[(u64, u32)]) -> (Kernel, Vec<u64>) {
        let mut k = Kernel::new();
        k.types
            .insert("struct hlist_head", TypeDescriptor::new(8).field("first", 0, 8))
            .insert(
                "struct hlist_node",
                TypeDescriptor::new(16).field("next", 0, 8).field("pprev", 8, 8),
            )
            .insert(
                "struct upid",
                TypeDescriptor::new(0x20)
                    .field("nr", 0, 4)
                    .field("ns", 8, 8)
                    .typed_field("pid_chain", 0x10, 16, "struct hlist_node"),
            );

        let table = k.alloc(4 * 8);
        let slot = k.alloc(8);
        let shift = k.alloc(4);
        k.image.put_u64(slot, table);
        k.image.put_u64(shift, 2);
        k.symbol("pid_hash", slot);
        k.symbol("pidhash_shift", shift);

        let mut upids = Vec::new();
        let mut tails: Vec<u64> = (0..4).map(|b| table + b * 8).collect();
        for &(bucket, nr) in pids {
            let upid = k.alloc(0x20);
            k.image.put_u64(upid, nr as u64);
            k.image.put_u64(upid + 8, INIT_NS);
            let node = upid + 0x10;
            let tail = tails[bucket as usize];
            k.image.put_u64(tail, node);
            k.image.put_u64(node + 8, tail);
            tails[bucket as usize] = node;
            upids.push(upid);
        }
        (k, upids)
    }

    const PIDS: &[(u64, u32)] = &[(1, 1), (2, 2), (1, 5), (0, 300)];

    fn rows(text: &str) -> Vec<(String, String)> {
        text.lines()
            .skip(2)
            .take_while(|line| !line.is_empty())
            .map(|line| {
                let cols: Vec<_> = line.split_whitespace().collect();
                (cols[0].to_string(), cols[2].to_string())
            })
            .collect()
    }

    fn generate(k: Kernel) -> String {
        let session = k.session(V4_14);
        let sink = MemorySink::new();
        let result = run_report(&session, &Pids, &sink);
        assert!(matches!(result.outcome, Outcome::Written), "{:?}", result.outcome);
        sink.get("pids").unwrap()
    }

    #[test]
    fn every_chain_is_walked() {
        let (k, _) = kernel(PIDS);
        let text = generate(k);
        let expected = [("1", "1"), ("2", "2"), ("5", "1"), ("300", "0")];
        let expected: Vec<_> = expected.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect();
        assert_eq!(rows(&text), expected);
        assert!(!text.contains('!'));
    }

    #[test]
    fn bad_pprev_is_noted() {
        let (mut k, upids) = kernel(PIDS);
        k.image.put_u64(upids[2] + 0x18, 0x42);
        let text = generate(k);
        assert_eq!(rows(&text).len(), 4);
        assert!(text.contains("pprev is 0x42"));
    }

    #[test]
    fn broken_chain_keeps_other_buckets() {
        let (mut k, upids) = kernel(PIDS);
        k.image.put_u64(upids[0] + 0x10, 0xffff_ffff_ffff_fff8);
        let text = generate(k);
        let nrs: Vec<_> = rows(&text).into_iter().map(|(nr, _)| nr).collect();
        assert_eq!(nrs, ["1", "2", "300"]);
        assert!(text.contains("pid_hash walk stopped early"));
    }

    #[test]
    fn gone_in_4_15() {
        let (k, _) = kernel(PIDS);
        let session = k.session(KernelVersion::new(4, 19, 0));
        let result = run_report(&session, &Pids, &MemorySink::new());
        assert!(matches!(result.outcome, Outcome::Skipped(_)));
    }
}
