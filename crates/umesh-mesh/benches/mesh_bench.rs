use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use umesh_core::{Sid, SidType, Uuid};
use umesh_mesh::fragments::fragment;
use umesh_mesh::{Fragments, Handler, Message, MessageInfo, NodeId, Scheduler, SidAllocator, TaskArg};

fn make_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn bench_fragments(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragments");

    for size in [256usize, 1280, 2047] {
        let payload = make_payload(size);

        group.bench_with_input(BenchmarkId::new("fragment", size), &payload, |b, p| {
            b.iter(|| fragment(p, 127, 7));
        });

        let frames = fragment(&payload, 127, 7).unwrap_or_default();
        group.bench_with_input(BenchmarkId::new("reassemble", size), &frames, |b, frames| {
            b.iter(|| {
                let mut frags = Fragments::new();
                let info = MessageInfo {
                    src: Sid(0x0100),
                    ..MessageInfo::default()
                };
                let mut done = None;
                for frame in frames {
                    if let Ok(Some(m)) = frags.reassemble(Message::new(frame.clone(), info)) {
                        done = Some(m);
                    }
                }
                done
            });
        });
    }

    group.finish();
}

fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");

    group.bench_function("post_run_1000", |b| {
        let sched: Scheduler<u64> = Scheduler::new();
        let handler = Handler::new(|count: &mut u64, arg: TaskArg| *count += arg.0);
        b.iter(|| {
            let mut count = 0u64;
            for i in 0..1000 {
                let _ = sched.post(&handler, TaskArg(i));
            }
            sched.run_pending(&mut count);
            count
        });
    });

    group.bench_function("post_cancel_delayed_100", |b| {
        let sched: Scheduler<()> = Scheduler::new();
        let handler = Handler::new(|_: &mut (), _| {});
        b.iter(|| {
            for i in 0..100 {
                let _ = sched.post_delayed(1000 + i, &handler, TaskArg(i));
            }
            for i in (0..100).rev() {
                sched.cancel_delayed(-1, &handler, TaskArg(i));
            }
        });
    });

    group.finish();
}

fn bench_sid(c: &mut Criterion) {
    let mut group = c.benchmark_group("sid");

    for sid_type in [SidType::Structured, SidType::Random] {
        let label = format!("{sid_type:?}");
        group.bench_function(BenchmarkId::new("allocate_fill", label), |b| {
            let nodes: Vec<NodeId> = (0..200u64).map(|i| NodeId::new(Uuid::from_u64(i))).collect();
            b.iter(|| {
                let mut alloc = SidAllocator::new(sid_type);
                for node in &nodes {
                    let _ = alloc.allocate(node);
                }
                alloc.get_allocated_number()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fragments, bench_scheduler, bench_sid);
criterion_main!(benches);
