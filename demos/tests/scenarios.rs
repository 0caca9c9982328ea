//! End-to-end scenario tests running a full `Renderer<FakeRhi>` frame and
//! asserting on the submit-context/barrier structure the frame executor
//! produced, rather than unit-testing individual compiler stages.

use helio_frame_graph::executor::FrameInputs;
use helio_frame_graph::name::Name;
use helio_frame_graph::pass::RenderPass;
use helio_frame_graph::resource::GraphMetadata;
use helio_frame_graph::rhi::fake::{FakeCommandBuffer, FakeRhi};
use helio_frame_graph::rhi::ResourceLayout;
use helio_frame_graph::{Renderer, RendererConfig};
use helio_frame_graph_demos::{init_logging, read_buffer_resource, write_back_buffer, write_buffer_resource, ScenarioPass};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("helio_demo_scenario_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn document(passes: &[(&str, &str)]) -> GraphMetadata {
    let entries: Vec<String> = passes.iter().map(|(name, ty)| format!(r#"{{"name": "{name}", "type": "{ty}"}}"#)).collect();
    let json = format!(r#"{{"textures": [], "render_passes": [{}]}}"#, entries.join(","));
    GraphMetadata::from_json(&json).unwrap()
}

fn renderer(name: &str, metadata: GraphMetadata, passes: Vec<Box<dyn RenderPass<FakeRhi>>>) -> (Arc<FakeRhi>, Renderer<FakeRhi>) {
    let rhi = Arc::new(FakeRhi::new());
    let config = RendererConfig { ring_size: 2, shader_cache_root: scratch_dir(name), width: 64, height: 64 };
    let renderer = Renderer::new(rhi.clone(), config, metadata, passes).unwrap();
    (rhi, renderer)
}

#[test]
fn linear_graphics_chain_is_one_submit_context_with_three_levels() {
    init_logging();
    let metadata = document(&[("scn1_a", "graphics"), ("scn1_b", "graphics"), ("scn1_c", "graphics")]);
    let t1 = Name::new("scn1_t1");
    let t2 = Name::new("scn1_t2");
    let passes: Vec<Box<dyn RenderPass<FakeRhi>>> = vec![
        ScenarioPass::new("scn1_a", move |ctx| write_buffer_resource(ctx, t1, ResourceLayout::COLOR_ATTACHMENT)),
        ScenarioPass::new("scn1_b", move |ctx| {
            read_buffer_resource(ctx, t1, ResourceLayout::SHADER_READ)?;
            write_buffer_resource(ctx, t2, ResourceLayout::COLOR_ATTACHMENT)
        }),
        ScenarioPass::new("scn1_c", move |ctx| {
            read_buffer_resource(ctx, t2, ResourceLayout::SHADER_READ)?;
            write_back_buffer(ctx)
        }),
    ];
    let (rhi, mut renderer) = renderer("linear_chain", metadata, passes);

    renderer.draw(FrameInputs::default()).unwrap();

    let submits = rhi.submits.lock();
    assert_eq!(submits.len(), 3, "one submit per dependency level even though all three nodes share a single submit context");
    assert!(submits.iter().all(|s| matches!(s.queue, helio_frame_graph::rhi::QueueType::Graphics)));
    assert!(!submits[0].waits.is_empty(), "the context carrying the back-buffer write waits on the acquired swap-chain image");
    assert!(!submits[2].signals.is_empty(), "the last level in the context signals the semaphore present waits on");
    assert_eq!(rhi.present_count.load(Ordering::Relaxed), 1);
}

#[test]
fn parallel_compute_producers_collapse_to_two_submits() {
    init_logging();
    let metadata = document(&[("scn2_a", "compute"), ("scn2_b", "compute"), ("scn2_c", "graphics")]);
    let t1 = Name::new("scn2_t1");
    let t2 = Name::new("scn2_t2");
    let passes: Vec<Box<dyn RenderPass<FakeRhi>>> = vec![
        ScenarioPass::new("scn2_a", move |ctx| write_buffer_resource(ctx, t1, ResourceLayout::GENERAL)),
        ScenarioPass::new("scn2_b", move |ctx| write_buffer_resource(ctx, t2, ResourceLayout::GENERAL)),
        ScenarioPass::new("scn2_c", move |ctx| {
            read_buffer_resource(ctx, t1, ResourceLayout::SHADER_READ)?;
            read_buffer_resource(ctx, t2, ResourceLayout::SHADER_READ)?;
            write_back_buffer(ctx)
        }),
    ];
    let (rhi, mut renderer) = renderer("parallel_producers", metadata, passes);

    renderer.draw(FrameInputs::default()).unwrap();

    let submits = rhi.submits.lock();
    assert_eq!(submits.len(), 2, "A and B share one compute-queue dependency level, C is alone on graphics");
    assert_eq!(submits.iter().filter(|s| matches!(s.queue, helio_frame_graph::rhi::QueueType::Compute)).count(), 1);
    assert_eq!(submits.iter().filter(|s| matches!(s.queue, helio_frame_graph::rhi::QueueType::Graphics)).count(), 1);
    let graphics_submit = submits.iter().find(|s| matches!(s.queue, helio_frame_graph::rhi::QueueType::Graphics)).unwrap();
    assert_eq!(graphics_submit.waits.len(), 1, "two cross-queue producers collapse to a single wait on the later compute submit");
    assert_eq!(rhi.present_count.load(Ordering::Relaxed), 1);
}

#[test]
fn multi_queue_read_of_one_view_produces_a_single_union_barrier() {
    init_logging();
    let metadata = document(&[("scn3_a", "graphics"), ("scn3_b", "compute"), ("scn3_c", "graphics")]);
    let t1 = Name::new("scn3_t1");
    let passes: Vec<Box<dyn RenderPass<FakeRhi>>> = vec![
        ScenarioPass::new("scn3_a", move |ctx| write_buffer_resource(ctx, t1, ResourceLayout::COLOR_ATTACHMENT)),
        ScenarioPass::new("scn3_b", move |ctx| read_buffer_resource(ctx, t1, ResourceLayout::SHADER_READ)),
        ScenarioPass::new("scn3_c", move |ctx| read_buffer_resource(ctx, t1, ResourceLayout::SHADER_READ)),
    ];
    let (rhi, mut renderer) = renderer("multi_queue_read", metadata, passes);

    renderer.draw(FrameInputs::default()).unwrap();

    let submits = rhi.submits.lock();
    let total_barriers: usize = submits.iter().map(|s| s.barrier_count).sum();
    assert_eq!(total_barriers, 2, "one barrier for A's write, one for the union read shared by B and C, not two separate read barriers");
    assert_eq!(rhi.present_count.load(Ordering::Relaxed), 0, "nothing writes the back buffer in this scenario");
}

#[test]
fn ray_tracing_bvh_wait_is_consumed_by_the_first_pass_only() {
    init_logging();
    let json = r#"
    {
        "textures": [],
        "render_passes": [
            { "name": "scn4_p1", "type": "compute", "pipeline": { "name": "scn4_rt1", "shaders": [ { "path": "scn4_a.wgsl", "type": "ray_generation", "entry_point": "main" } ] } },
            { "name": "scn4_p2", "type": "compute", "pipeline": { "name": "scn4_rt2", "shaders": [ { "path": "scn4_b.wgsl", "type": "ray_generation", "entry_point": "main" } ] } }
        ]
    }
    "#;
    let metadata = GraphMetadata::from_json(json).unwrap();
    let r = Name::new("scn4_r");
    let passes: Vec<Box<dyn RenderPass<FakeRhi>>> = vec![
        ScenarioPass::new("scn4_p1", move |ctx| write_buffer_resource(ctx, r, ResourceLayout::GENERAL)),
        ScenarioPass::new("scn4_p2", move |ctx| read_buffer_resource(ctx, r, ResourceLayout::SHADER_READ)),
    ];
    let (rhi, mut renderer) = renderer("ray_tracing_wait", metadata, passes);

    let inputs = FrameInputs { upload_commands: None, blas_build_commands: Some(FakeCommandBuffer::default()) };
    renderer.draw(inputs).unwrap();

    let submits = rhi.submits.lock();
    assert!(submits.len() >= 2, "at least the BLAS-build submit and the first ray-tracing pass's submit");
    let blas_semaphore = submits[0].signals[0];
    assert!(submits[1].waits.contains(&blas_semaphore), "the pass carrying node level 0 waits on the BVH build");
    assert!(
        submits[2..].iter().all(|s| !s.waits.contains(&blas_semaphore)),
        "once consumed, no later submit this frame waits on the same BVH-build semaphore again"
    );
}

#[test]
fn cyclic_declaration_is_reported_rather_than_hanging() {
    init_logging();
    let metadata = document(&[("scn5_a", "graphics"), ("scn5_b", "graphics")]);
    let t1 = Name::new("scn5_t1");
    let t2 = Name::new("scn5_t2");
    let passes: Vec<Box<dyn RenderPass<FakeRhi>>> = vec![
        ScenarioPass::new("scn5_a", move |ctx| {
            write_buffer_resource(ctx, t1, ResourceLayout::GENERAL)?;
            read_buffer_resource(ctx, t2, ResourceLayout::GENERAL)
        }),
        ScenarioPass::new("scn5_b", move |ctx| {
            write_buffer_resource(ctx, t2, ResourceLayout::GENERAL)?;
            read_buffer_resource(ctx, t1, ResourceLayout::GENERAL)
        }),
    ];
    let (_rhi, mut renderer) = renderer("cyclic", metadata, passes);

    let err = renderer.draw(FrameInputs::default()).unwrap_err();
    assert!(matches!(err, helio_frame_graph::Error::CyclicDependency { .. }));
}

#[test]
fn stable_cross_frame_resource_set_allocates_only_once() {
    init_logging();
    let metadata = document(&[("scn6_a", "graphics"), ("scn6_b", "graphics")]);
    let t1 = Name::new("scn6_t1");
    let passes: Vec<Box<dyn RenderPass<FakeRhi>>> = vec![
        ScenarioPass::new("scn6_a", move |ctx| write_buffer_resource(ctx, t1, ResourceLayout::GENERAL)),
        ScenarioPass::new("scn6_b", move |ctx| read_buffer_resource(ctx, t1, ResourceLayout::SHADER_READ)),
    ];
    let (rhi, mut renderer) = renderer("stable_set", metadata, passes);

    renderer.draw(FrameInputs::default()).unwrap();
    assert_eq!(rhi.buffer_creates.load(Ordering::Relaxed), 1);

    renderer.draw(FrameInputs::default()).unwrap();
    assert_eq!(rhi.buffer_creates.load(Ordering::Relaxed), 1, "the second frame declares the same resource set, so nothing new is created");
}
