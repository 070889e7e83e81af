//! Switching between images: precondition faults, first-entry stack
//! relocation, and teardown quiescence.

mod support;

use kernel_image::{
    Asid, BootBacking, CoreContext, CoreId, ImageError, ImageId, ImagePlan, ImageSwitcher,
    ImageTable, MapDepths, RegionCatalog, build_image, clone_image, init_boot_image,
};
use kernel_layout::{WindowLayout, memory};
use kernel_vmem::{PageTableAbi, Sv39Tables};
use support::{Arena, BumpAlloc, MockCore};

struct Env {
    layout: WindowLayout,
    plan: ImagePlan,
    arena: Arena,
    images: ImageTable,
    boot_id: ImageId,
    clone_id: ImageId,
}

/// Boot image 0, then build and clone image 1.
fn env() -> Env {
    let layout = WindowLayout::platform();
    let plan = ImagePlan::new(
        RegionCatalog::new(&layout),
        Sv39Tables::<Arena>::GEOMETRY,
        MapDepths::new(memory::PHYS_WINDOW_DEPTH, memory::DEVICE_DEPTH),
    )
    .unwrap();
    let arena = Arena::new(2048);
    let mut alloc = BumpAlloc::over_arena(2048);
    let tables = Sv39Tables::new(&arena);

    let mut images = ImageTable::new();
    let boot_id = images.create(Asid::BOOT).unwrap();
    init_boot_image(
        &plan,
        &layout,
        &BootBacking::platform(),
        &tables,
        &arena,
        &mut alloc,
        images.get_mut(boot_id),
    )
    .unwrap();

    let clone_id = images.create(Asid::new(1)).unwrap();
    build_image(&plan, &tables, &arena, &mut alloc, images.get_mut(clone_id)).unwrap();
    let (dest, src) = images.pair_mut(clone_id, boot_id);
    clone_image(&plan, &tables, &arena, dest, src).unwrap();

    Env {
        layout,
        plan,
        arena,
        images,
        boot_id,
        clone_id,
    }
}

#[test]
fn switching_to_a_non_runnable_image_faults_and_changes_nothing() {
    let mut env = env();
    let tables = Sv39Tables::new(&env.arena);
    let switcher = ImageSwitcher::new(&env.plan, &env.layout, &tables, &env.arena);

    let dead_id = env.images.create(Asid::new(2)).unwrap();
    let mut ctx = CoreContext::new(CoreId::new(0), env.boot_id);
    let mut hw = MockCore::new(env.layout.stack_top(0));

    assert_eq!(
        switcher
            .set_kernel_image(&mut ctx, &mut env.images, dead_id, &mut hw)
            .unwrap_err(),
        ImageError::NotRunnable
    );
    assert_eq!(ctx.current(), env.boot_id);
    assert!(hw.installed_roots.is_empty());
}

#[test]
fn switching_to_the_current_image_is_a_no_op() {
    let mut env = env();
    let tables = Sv39Tables::new(&env.arena);
    let switcher = ImageSwitcher::new(&env.plan, &env.layout, &tables, &env.arena);

    let mut ctx = CoreContext::new(CoreId::new(0), env.boot_id);
    let mut hw = MockCore::new(env.layout.stack_top(0));

    switcher
        .set_kernel_image(&mut ctx, &mut env.images, env.boot_id, &mut hw)
        .unwrap();
    assert!(hw.installed_roots.is_empty());
    assert_eq!(hw.barriers.get(), 0);
}

#[test]
fn first_switch_relocates_the_live_stack() {
    let mut env = env();
    let tables = Sv39Tables::new(&env.arena);
    let switcher = ImageSwitcher::new(&env.plan, &env.layout, &tables, &env.arena);

    let stack_top = env.layout.stack_top(0);
    let sp = stack_top.wrapping_sub(64);
    let canary: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(7).wrapping_add(3)).collect();

    // Write the in-flight frames through the boot image's own mapping.
    let boot_root = env.images.get(env.boot_id).root().unwrap();
    let live = tables.translate(boot_root, sp).unwrap();
    env.arena.write(live, &canary);

    let mut ctx = CoreContext::new(CoreId::new(0), env.boot_id);
    let mut hw = MockCore::new(sp);

    switcher
        .set_kernel_image(&mut ctx, &mut env.images, env.clone_id, &mut hw)
        .unwrap();

    // The clone is current, its root was installed under its ASID, and
    // execution resumes at the same stack pointer.
    assert_eq!(ctx.current(), env.clone_id);
    let clone_root = env.images.get(env.clone_id).root().unwrap();
    assert_eq!(
        hw.installed_roots.as_slice(),
        &[(clone_root.base(), Asid::new(1))]
    );
    assert_eq!(hw.sp, sp);

    // The in-flight frames were copied into the clone's private backing —
    // a distinct page with identical bytes.
    let relocated = tables.translate(clone_root, sp).unwrap();
    assert_ne!(relocated, live);
    assert_eq!(env.arena.read(relocated, 64), canary);

    // Bookkeeping: the clone's stack is primed, the departing image saved
    // its stack pointer, and the core is recorded against the clone.
    let clone = env.images.get(env.clone_id);
    assert!(clone.stack_initialized());
    assert!(clone.nodes_executed().contains(CoreId::new(0)));
    assert_eq!(env.images.get(env.boot_id).stack_pointer(), sp);
    assert!(hw.barriers.get() >= 2);
}

#[test]
fn switching_back_restores_the_saved_stack_pointer() {
    let mut env = env();
    let tables = Sv39Tables::new(&env.arena);
    let switcher = ImageSwitcher::new(&env.plan, &env.layout, &tables, &env.arena);

    let stack_top = env.layout.stack_top(0);
    let boot_sp = stack_top.wrapping_sub(128);
    let mut ctx = CoreContext::new(CoreId::new(0), env.boot_id);
    let mut hw = MockCore::new(boot_sp);

    switcher
        .set_kernel_image(&mut ctx, &mut env.images, env.clone_id, &mut hw)
        .unwrap();

    // Run "deeper" on the clone's stack, then switch back.
    let clone_sp = stack_top.wrapping_sub(512);
    hw.sp = clone_sp;
    switcher
        .set_kernel_image(&mut ctx, &mut env.images, env.boot_id, &mut hw)
        .unwrap();

    assert_eq!(ctx.current(), env.boot_id);
    // The boot image resumes where it left off.
    assert_eq!(hw.sp, boot_sp);
    // The clone remembers where it stopped.
    assert_eq!(env.images.get(env.clone_id).stack_pointer(), clone_sp);

    // A second entry into the clone must not re-prime the stack.
    let boot_sp_2 = stack_top.wrapping_sub(32);
    hw.sp = boot_sp_2;
    switcher
        .set_kernel_image(&mut ctx, &mut env.images, env.clone_id, &mut hw)
        .unwrap();
    assert_eq!(hw.sp, clone_sp);
}

#[test]
fn idle_switch_targets_the_bound_idle_image() {
    let mut env = env();
    let tables = Sv39Tables::new(&env.arena);
    let switcher = ImageSwitcher::new(&env.plan, &env.layout, &tables, &env.arena);

    let mut ctx = CoreContext::new(CoreId::new(0), env.clone_id);
    let mut hw = MockCore::new(env.layout.stack_top(0));

    // The domain's idle image here is the boot image.
    switcher.switch_to_idle_image(&mut ctx, &mut env.images, env.boot_id, &mut hw);
    assert_eq!(ctx.current(), env.boot_id);
    assert_eq!(hw.installed_roots.len(), 1);
}

#[test]
fn invalidated_images_quiesce_after_the_last_core_leaves() {
    let mut env = env();
    let tables = Sv39Tables::new(&env.arena);
    let switcher = ImageSwitcher::new(&env.plan, &env.layout, &tables, &env.arena);

    let core = CoreId::new(0);
    let mut ctx = CoreContext::new(core, env.boot_id);
    let mut hw = MockCore::new(env.layout.stack_top(0).wrapping_sub(16));

    switcher
        .set_kernel_image(&mut ctx, &mut env.images, env.clone_id, &mut hw)
        .unwrap();

    // Begin teardown: mark the clone unusable and kick it off this core.
    env.images.get_mut(env.clone_id).invalidate();
    switcher
        .set_kernel_image(&mut ctx, &mut env.images, env.boot_id, &mut hw)
        .unwrap();

    // A further entry is refused.
    assert_eq!(
        switcher
            .set_kernel_image(&mut ctx, &mut env.images, env.clone_id, &mut hw)
            .unwrap_err(),
        ImageError::NotRunnable
    );

    // Reclaim only once every core has acknowledged.
    let clone = env.images.get_mut(env.clone_id);
    assert!(!clone.is_quiescent());
    clone.clear_node(core);
    assert!(clone.is_quiescent());
}
