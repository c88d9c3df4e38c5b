use super::tables::{TableBuilder, add_field};
use super::{Report, Session, write_problems};
use crate::error::{Error, Result};
use crate::memory::offset_addr;
use crate::walk::{ListWalker, WalkEnd};
use std::collections::HashSet;
use std::io::Write;
use std::ops::ControlFlow;

/// Every task_struct's `sched_class` points at one of these.
const SCHED_CLASSES: &[&str] = &[
    "stop_sched_class",
    "dl_sched_class",
    "rt_sched_class",
    "fair_sched_class",
    "idle_sched_class",
    "ext_sched_class",
];

pub struct Tasks;

struct Task {
    addr: u64,
    pid: i32,
    tgid: i32,
    comm: String,
    state: u64,
}

impl Report for Tasks {
    fn name(&self) -> &'static str {
        "tasks"
    }

    fn description(&self) -> &'static str {
        "processes on init_task's task list"
    }

    fn generate(&self, session: &Session, out: &mut dyn Write) -> Result<()> {
        let init = session.symbol("init_task")?;
        let link = session.types.field_offset("struct task_struct", "tasks")?;
        let head = offset_addr(init, link)?;
        let classes: HashSet<u64> = SCHED_CLASSES.iter().filter_map(|name| session.symbol(name).ok()).collect();
        let check = |task| check_task(session, &classes, task);

        let mut found = vec![init];
        let mut problems = Vec::new();
        let forward = ListWalker::new(&session.space, head, link)
            .layout(session.list_layout())
            .limits(session.limits())
            .walk(|task| match check(task) {
                Ok(()) => {
                    found.push(task);
                    ControlFlow::Continue(())
                }
                Err(err) => {
                    problems.push(err);
                    ControlFlow::Break(())
                }
            });

        // Past a break the rest of the list is still reachable through prev.
        let broken = forward.end == WalkEnd::Truncated || !problems.is_empty();
        let mut tail = Vec::new();
        if broken {
            let seen: HashSet<u64> = found.iter().copied().collect();
            let backward = ListWalker::new(&session.space, head, link)
                .layout(session.list_layout())
                .limits(session.limits())
                .walk_reverse(|task| {
                    if seen.contains(&task) {
                        return ControlFlow::Break(());
                    }
                    match check(task) {
                        Ok(()) => {
                            tail.push(task);
                            ControlFlow::Continue(())
                        }
                        Err(err) => {
                            problems.push(err);
                            ControlFlow::Break(())
                        }
                    }
                });
            if backward.end == WalkEnd::Aborted {
                return Err(Error::Aborted);
            }
            problems.extend(backward.diagnostics);
        }
        let forward_count = found.len();
        found.extend(tail.iter().rev());

        let mut tasks = Vec::new();
        for addr in found {
            match read_task(session, addr) {
                Ok(task) => tasks.push(task),
                Err(err) => problems.push(Error::corrupt(addr, format!("skipped task: {err}"))),
            }
        }

        let mut builder = TableBuilder::new();
        builder.add_col_r("pid", "thread id");
        builder.add_col_r("tgid", "process id");
        builder.add_col_l("comm", "executable name");
        builder.add_col_l("state", "scheduler state: R running, S sleeping, D disk sleep, I idle, T stopped");
        builder.add_col_r("task", "address of the struct task_struct");
        for t in &tasks {
            add_field!(builder, "pid", t.pid);
            add_field!(builder, "tgid", t.tgid);
            add_field!(builder, "comm", t.comm);
            add_field!(builder, "state", state_letter(t.state));
            add_field!(builder, "task", "{:x}", t.addr);
        }
        builder.write(out, true, session.explain)?;
        if broken {
            writeln!(out)?;
            writeln!(
                out,
                "warning: task list is broken after {forward_count} tasks, found {} more walking it backwards",
                tail.len()
            )?;
        }
        write_problems(out, "tasks", &forward, &problems)
    }
}

/// Rejects list entries that don't look like a task_struct.
fn check_task(session: &Session, classes: &HashSet<u64>, task: u64) -> Result<()> {
    let view = session.view(task, "struct task_struct");
    if !classes.is_empty() {
        let class = view.get_pointer("sched_class")?;
        if !classes.contains(&class) {
            return Err(Error::corrupt(task, format!("sched_class {class:#x} isn't a scheduler class")));
        }
    }
    let cpus = session.space.per_cpu_offsets().len();
    if cpus > 0 && session.types.has_field("struct task_struct", "cpu") {
        let cpu = view.get_u32("cpu")? as i32;
        if cpu < 0 || cpu as usize >= cpus {
            return Err(Error::corrupt(task, format!("cpu {cpu} is not one of the {cpus} cpus")));
        }
    }
    Ok(())
}

fn read_task(session: &Session, addr: u64) -> Result<Task> {
    let view = session.view(addr, "struct task_struct");
    let state = session.layout.get("task_struct.state")?;
    Ok(Task {
        addr,
        pid: view.get_u32("pid")? as i32,
        tgid: view.get_u32("tgid")? as i32,
        comm: view.get_cstring("comm")?,
        state: session
            .space
            .read_uint(offset_addr(addr, state.layout.offset)?, state.layout.size as usize)?,
    })
}

fn state_letter(state: u64) -> char {
    const TASK_IDLE: u64 = 0x402;
    match state {
        0 => 'R',
        s if s & TASK_IDLE == TASK_IDLE => 'I',
        s if s & 1 != 0 => 'S',
        s if s & 2 != 0 => 'D',
        s if s & 0xc != 0 => 'T',
        _ => '?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::{KernelVersion, TypeDescriptor};
    use crate::memory::PerCpuOffsetTable;
    use crate::reports::testing::Kernel;
    use crate::reports::{MemorySink, Outcome, run_report};

    const FAIR: u64 = 0xffff_ffc0_1100_0000;
    const IDLE: u64 = 0xffff_ffc0_1100_0100;

    /// A task list of init_task plus `tasks`, returning the kernel and every task's
    /// address (init_task first).
    fn kernel(version: KernelVersion, tasks: &[(i32, i32, &str, u64)]) -> (Kernel, Vec<u64>) {
        let mut k = Kernel::new();
        let task = TypeDescriptor::new(0x80)
            .typed_field("tasks", 0x10, 16, "struct list_head")
            .field("pid", 0x20, 4)
            .field("tgid", 0x24, 4)
            .field("comm", 0x28, 16)
            .field("sched_class", 0x40, 8)
            .field("cpu", 0x48, 4);
        let task = if version < KernelVersion::new(5, 14, 0) {
            task.field("state", 0, 8)
        } else {
            task.field("__state", 0, 4)
        };
        k.types.insert("struct task_struct", task);
        k.symbol("fair_sched_class", FAIR);
        k.symbol("idle_sched_class", IDLE);

        let mut addrs = Vec::new();
        for (i, &(pid, tgid, comm, state)) in [(0, 0, "swapper/0", 0)].iter().chain(tasks).enumerate() {
            let addr = k.alloc(0x80);
            k.image.put_u64(addr, state);
            k.image.put_u64(addr + 0x20, (pid as u32 as u64) | ((tgid as u32 as u64) << 32));
            k.put_str(addr + 0x28, comm);
            k.image.put_u64(addr + 0x40, if i == 0 { IDLE } else { FAIR });
            k.image.put_u64(addr + 0x48, (i % 4) as u64);
            addrs.push(addr);
        }
        k.symbol("init_task", addrs[0]);
        let links: Vec<u64> = addrs[1..].iter().map(|a| a + 0x10).collect();
        k.link(addrs[0] + 0x10, &links);
        (k, addrs)
    }

    const TASKS: &[(i32, i32, &str, u64)] = &[
        (1, 1, "init", 1),
        (2, 2, "kthreadd", 1),
        (301, 301, "logd", 0),
        (302, 301, "logd.writer", 0x402),
    ];

    fn rows(text: &str) -> Vec<Vec<&str>> {
        text.lines()
            .skip(2)
            .take_while(|line| !line.is_empty())
            .map(|line| line.split_whitespace().take(4).collect())
            .collect()
    }

    fn generate(k: Kernel, version: KernelVersion) -> String {
        let session = k.session(version);
        let sink = MemorySink::new();
        let result = run_report(&session, &Tasks, &sink);
        assert!(matches!(result.outcome, Outcome::Written), "{:?}", result.outcome);
        sink.get("tasks").unwrap()
    }

    #[test]
    fn every_task_in_list_order() {
        for version in [KernelVersion::new(5, 10, 0), KernelVersion::new(6, 1, 0)] {
            let (k, _) = kernel(version, TASKS);
            let text = generate(k, version);
            assert_eq!(
                rows(&text),
                [
                    ["0", "0", "swapper/0", "R"],
                    ["1", "1", "init", "S"],
                    ["2", "2", "kthreadd", "S"],
                    ["301", "301", "logd", "R"],
                    ["302", "301", "logd.writer", "I"],
                ],
                "{version}"
            );
            assert!(!text.contains("warning"), "{version}");
        }
    }

    #[test]
    fn broken_next_pointer_walks_backwards() {
        let version = KernelVersion::new(6, 1, 0);
        let (mut k, addrs) = kernel(version, TASKS);
        k.image.put_u64(addrs[2] + 0x10, 0xdead_0000);
        let text = generate(k, version);
        let pids: Vec<_> = rows(&text).iter().map(|r| r[0]).collect();
        assert_eq!(pids, ["0", "1", "2", "301", "302"]);
        assert!(text.contains("found 2 more walking it backwards"));
        assert!(text.contains("is not mapped"));
    }

    #[test]
    fn bogus_task_is_left_out() {
        let version = KernelVersion::new(6, 1, 0);
        let (mut k, addrs) = kernel(version, TASKS);
        k.image.put_u64(addrs[2] + 0x40, 0x1234);
        let text = generate(k, version);
        let pids: Vec<_> = rows(&text).iter().map(|r| r[0]).collect();
        assert_eq!(pids, ["0", "1", "301", "302"]);
        assert!(text.contains("isn't a scheduler class"));
    }

    #[test]
    fn cpu_out_of_range_is_bogus() {
        let version = KernelVersion::new(6, 1, 0);
        let (mut k, addrs) = kernel(version, TASKS);
        k.image.put_u64(addrs[4] + 0x48, 9);
        let mut session = k.session(version);
        session.space.set_per_cpu_offsets(PerCpuOffsetTable::new(vec![0; 4]));
        let sink = MemorySink::new();
        assert!(run_report(&session, &Tasks, &sink).is_written());
        let text = sink.get("tasks").unwrap();
        let pids: Vec<_> = rows(&text).iter().map(|r| r[0]).collect();
        assert_eq!(pids, ["0", "1", "2", "301"]);
        assert!(text.contains("cpu 9 is not one of the 4 cpus"));
    }
}
