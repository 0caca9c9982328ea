//! Shared scaffolding for the scenario tests under `tests/`: a render pass
//! whose `schedule_resources` behavior is supplied by the caller, so each
//! scenario can wire exactly the graph edges it needs without a new concrete
//! pass type per test, plus a couple of free functions for declaring a
//! throwaway buffer resource's read/write dependencies.

use helio_frame_graph::error::Result;
use helio_frame_graph::name::{Name, BACK_BUFFER_NAME};
use helio_frame_graph::pass::{RenderPass, ScheduleContext};
use helio_frame_graph::resource::ViewName;
use helio_frame_graph::rhi::fake::FakeRhi;
use helio_frame_graph::rhi::{BufferInfo, BufferUsage, ResourceLayout};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

type ScheduleFn = Box<dyn Fn(&mut ScheduleContext) -> Result<()> + Send + Sync>;

pub struct ScenarioPass {
    name: Name,
    schedule: ScheduleFn,
}

impl ScenarioPass {
    pub fn new(name: &str, schedule: impl Fn(&mut ScheduleContext) -> Result<()> + Send + Sync + 'static) -> Box<dyn RenderPass<FakeRhi>> {
        Box::new(Self { name: Name::new(name), schedule: Box::new(schedule) })
    }
}

impl RenderPass<FakeRhi> for ScenarioPass {
    fn name(&self) -> Name {
        self.name
    }

    fn schedule_resources(&self, ctx: &mut ScheduleContext) -> Result<()> {
        (self.schedule)(ctx)
    }

    fn execute(&mut self, _cmd: &mut <FakeRhi as helio_frame_graph::rhi::Rhi>::CommandBuffer) -> Result<()> {
        Ok(())
    }
}

/// Queues a tiny storage buffer's primary allocation and records a write
/// dependency against it at `layout`. Used by scenario tests that just need
/// some resource to pass between passes, without caring about its contents.
pub fn write_buffer_resource(ctx: &mut ScheduleContext, name: Name, layout: ResourceLayout) -> Result<()> {
    let pass = ctx.pass_name;
    let view = ViewName::encode(name, 0);
    let info = helio_frame_graph::resource::ResourceInfo::Buffer(BufferInfo { size: 4, usage: BufferUsage::STORAGE_BUFFER });
    ctx.resources.queue_resource_allocation(pass, name, info, Box::new(move |resource| resource.scheduling_info.add_view_info(pass, 0, layout)));
    ctx.graph.add_write_dependency(pass, name, view)
}

/// Records a read dependency against a resource some earlier pass in this
/// frame already allocated.
pub fn read_buffer_resource(ctx: &mut ScheduleContext, name: Name, layout: ResourceLayout) -> Result<()> {
    let pass = ctx.pass_name;
    let view = ViewName::encode(name, 0);
    ctx.resources.queue_resource_usage(pass, name, Box::new(move |resource| resource.scheduling_info.add_view_info(pass, 0, layout)));
    ctx.graph.add_read_dependency(pass, view);
    Ok(())
}

pub fn write_back_buffer(ctx: &mut ScheduleContext) -> Result<()> {
    let pass = ctx.pass_name;
    let back_buffer = Name::new(BACK_BUFFER_NAME);
    ctx.graph.add_write_dependency(pass, back_buffer, ViewName::encode(back_buffer, 0))
}
