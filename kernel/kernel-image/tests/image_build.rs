//! Building a kernel image: the counting pass and the placement pass must
//! agree, placement must be deterministic, and no two placements may
//! collide.

mod support;

use kernel_image::{
    Asid, ImageError, ImagePlan, KernelImage, MapDepths, MappingDescriptor, RegionCatalog,
    RegionId, build_image, locate_next_slot, map_memory,
};
use kernel_layout::{WindowLayout, memory};
use kernel_vmem::{BlockSource, Sv39Tables};
use support::{Arena, BumpAlloc};

fn platform_plan() -> (WindowLayout, ImagePlan) {
    let layout = WindowLayout::platform();
    let catalog = RegionCatalog::new(&layout);
    let plan = ImagePlan::new(
        catalog,
        Sv39Tables::<Arena>::GEOMETRY,
        MapDepths::new(memory::PHYS_WINDOW_DEPTH, memory::DEVICE_DEPTH),
    )
    .expect("platform plan");
    (layout, plan)
}

/// Build one image, returning every descriptor the mapper produced.
fn build_collecting(
    plan: &ImagePlan,
    arena: &Arena,
    alloc: &mut BumpAlloc,
    image: &mut KernelImage,
) -> Vec<MappingDescriptor> {
    let tables = Sv39Tables::new(arena);
    let mut placed = Vec::new();
    loop {
        match locate_next_slot(plan, image) {
            Ok(mapping) => {
                let block = alloc
                    .alloc_block(plan.geometry().size_bits(mapping.level))
                    .expect("arena exhausted");
                map_memory(plan, &tables, arena, image, &mapping, block).expect("map");
                placed.push(mapping);
            }
            Err(ImageError::FullyMapped) => return placed,
            Err(e) => panic!("unexpected mapper error: {e}"),
        }
    }
}

#[test]
fn counting_and_placement_agree_on_the_total() {
    let (_, plan) = platform_plan();
    let arena = Arena::new(2048);
    let mut alloc = BumpAlloc::over_arena(2048);
    let mut image = KernelImage::new(Asid::new(1));

    let placed = build_collecting(&plan, &arena, &mut alloc, &mut image);

    assert_eq!(placed.len() as u64, plan.total_memories());
    assert_eq!(image.memories_mapped(), plan.total_memories());
}

#[test]
fn locating_is_pure_in_the_mapped_count() {
    let (_, plan) = platform_plan();
    let arena = Arena::new(2048);
    let tables = Sv39Tables::new(&arena);
    let mut alloc = BumpAlloc::over_arena(2048);
    let mut image = KernelImage::new(Asid::new(1));

    // Repeated calls without an intervening map return the same slot, at
    // every step of the build.
    while image.memories_mapped() < plan.total_memories() {
        let first = locate_next_slot(&plan, &image).unwrap();
        let second = locate_next_slot(&plan, &image).unwrap();
        assert_eq!(first, second);

        let block = alloc
            .alloc_block(plan.geometry().size_bits(first.level))
            .unwrap();
        map_memory(&plan, &tables, &arena, &mut image, &first, block).unwrap();
    }
}

#[test]
fn placements_never_overlap() {
    let (_, plan) = platform_plan();
    let arena = Arena::new(2048);
    let mut alloc = BumpAlloc::over_arena(2048);
    let mut image = KernelImage::new(Asid::new(1));

    let placed = build_collecting(&plan, &arena, &mut alloc, &mut image);

    let ranges: Vec<(u64, u64)> = placed
        .iter()
        .map(|m| {
            let size = 1u64 << plan.geometry().size_bits(m.level);
            (m.vaddr.as_u64(), m.vaddr.as_u64() + size)
        })
        .collect();

    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            assert!(
                a.1 <= b.0 || b.1 <= a.0,
                "placements overlap: {a:x?} vs {b:x?}"
            );
        }
    }
}

#[test]
fn placement_order_walks_levels_root_first() {
    let (layout, plan) = platform_plan();
    let arena = Arena::new(2048);
    let mut alloc = BumpAlloc::over_arena(2048);
    let mut image = KernelImage::new(Asid::new(1));

    let placed = build_collecting(&plan, &arena, &mut alloc, &mut image);

    // Levels never decrease along the build.
    assert!(placed.windows(2).all(|w| w[0].level <= w[1].level));

    // The first placement is the root spanning the whole window, followed
    // by the level-1 tables: the retained image's, then the device
    // window's.
    assert_eq!(placed[0].level, 0);
    assert_eq!(placed[0].region, RegionId::Window);
    assert_eq!((placed[1].level, placed[1].region), (1, RegionId::Elf));
    assert_eq!((placed[2].level, placed[2].region), (1, RegionId::Device));
    assert_eq!(placed[2].vaddr, layout.device_start);
    assert_eq!((placed[3].level, placed[3].region), (2, RegionId::Elf));

    // The final level holds exactly the duplicated pages, in catalog
    // order: text, private, idle-thread.
    let last = plan.geometry().last_level();
    let pages: Vec<_> = placed.iter().filter(|m| m.level == last).collect();
    assert_eq!(pages.len(), 164);
    assert_eq!(pages[0].region, RegionId::Text);
    assert_eq!(pages[0].vaddr, layout.elf_start);
    assert_eq!(pages[128].region, RegionId::Private);
    assert_eq!(pages[160].region, RegionId::IdleThread);
}

#[test]
fn identical_builds_place_identically() {
    let (_, plan) = platform_plan();
    let arena = Arena::new(2048);
    let mut alloc = BumpAlloc::over_arena(2048);

    let mut first = KernelImage::new(Asid::new(1));
    let mut second = KernelImage::new(Asid::new(2));
    let a = build_collecting(&plan, &arena, &mut alloc, &mut first);
    let b = build_collecting(&plan, &arena, &mut alloc, &mut second);

    assert_eq!(a, b);
}

#[test]
fn mapping_past_the_end_is_rejected() {
    let (_, plan) = platform_plan();
    let arena = Arena::new(2048);
    let tables = Sv39Tables::new(&arena);
    let mut alloc = BumpAlloc::over_arena(2048);
    let mut image = KernelImage::new(Asid::new(1));

    build_image(&plan, &tables, &arena, &mut alloc, &mut image).unwrap();
    // Root, the two level-1 tables (image + device), the level-2 table,
    // and a page per copied page.
    assert_eq!(image.memories_mapped(), 4 + 164);

    assert_eq!(
        locate_next_slot(&plan, &image).unwrap_err(),
        ImageError::FullyMapped
    );

    let stale = MappingDescriptor {
        level: 0,
        vaddr: kernel_addresses::VirtualAddress::new(0xFFFF_FF80_0000_0000),
        region: RegionId::Window,
    };
    let block = alloc.alloc_block(12).unwrap();
    assert_eq!(
        map_memory(&plan, &tables, &arena, &mut image, &stale, block).unwrap_err(),
        ImageError::FullyMapped
    );
}

#[test]
fn non_root_mapping_before_the_root_is_rejected() {
    let (_, plan) = platform_plan();
    let arena = Arena::new(2048);
    let tables = Sv39Tables::new(&arena);
    let mut alloc = BumpAlloc::over_arena(2048);
    let mut image = KernelImage::new(Asid::new(1));

    let premature = MappingDescriptor {
        level: 1,
        vaddr: kernel_addresses::VirtualAddress::new(0xFFFF_FFFF_8000_0000),
        region: RegionId::Elf,
    };
    let block = alloc.alloc_block(12).unwrap();
    assert_eq!(
        map_memory(&plan, &tables, &arena, &mut image, &premature, block).unwrap_err(),
        ImageError::MissingRoot
    );
}

#[test]
fn allocator_exhaustion_surfaces_as_out_of_memory() {
    let (_, plan) = platform_plan();
    let arena = Arena::new(2048);
    let tables = Sv39Tables::new(&arena);
    // Room for three of the four intermediate tables, nothing more.
    let mut alloc = BumpAlloc::new(support::ALLOC_BASE, support::ALLOC_BASE + 3 * 4096);
    let mut image = KernelImage::new(Asid::new(1));

    assert_eq!(
        build_image(&plan, &tables, &arena, &mut alloc, &mut image).unwrap_err(),
        ImageError::OutOfMemory
    );
}
