//! Channel-Id Plan Tests
//!
//! The plan must leave room for every sub-channel plus the pre/post marker
//! and pack one sub-id per traversed layer into the 64-bit words.

mod common;

use common::TestModel;
use proptest::prelude::*;
use tbon_weaver::channel_id::ChannelIdPlan;

#[test]
fn plan_matches_fan_in_and_depth() {
    let t = TestModel::new();
    let layout = t.chain_layout(&[(0, 1024), (1, 64), (2, 4), (3, 1)]);
    let plan = ChannelIdPlan::for_layout(&layout);

    // Fan-in 16 at every hop: 5 bits with the marker, 4 hops.
    assert_eq!(plan.max_fan_in, 16);
    assert_eq!(plan.depth, 3);
    assert_eq!(plan.bits_per_sub_id, 5);
    assert_eq!(plan.num_words, 1);
}

#[test]
fn by_block_distribution_bounds_fan_in() {
    let t = TestModel::new();
    let mut layout = tbon_weaver::layout::LayerGraph::new();
    layout.add_layer(0, 1024, None).unwrap();
    layout.add_layer(1, 2, None).unwrap();
    layout
        .connect(
            0,
            1,
            t.inter_comm(),
            tbon_weaver::layout::Distribution::ByBlock(8),
        )
        .unwrap();
    assert_eq!(layout.max_fan_in(), 8);
}

#[test]
fn sub_field_offsets_are_contiguous() {
    let plan = ChannelIdPlan::new(7, 4);
    for depth in 0..=4u32 {
        assert_eq!(
            plan.sub_id_offset(depth),
            depth as u64 * plan.bits_per_sub_id as u64
        );
    }
}

proptest! {
    /// 2^bits >= fan_in + 1 and all sub-ids fit the allocated words.
    #[test]
    fn plan_is_sufficient(fan_in in 1u64..100_000, depth in 0u32..64) {
        let plan = ChannelIdPlan::new(fan_in, depth);
        prop_assert!(plan.bits_per_sub_id < 64);
        prop_assert!((1u64 << plan.bits_per_sub_id) >= fan_in + 1);
        let total = (depth as u64 + 1) * plan.bits_per_sub_id as u64;
        prop_assert!(total <= 64 * plan.num_words as u64);
    }

    /// The plan never wastes a whole word.
    #[test]
    fn plan_is_tight(fan_in in 1u64..100_000, depth in 0u32..64) {
        let plan = ChannelIdPlan::new(fan_in, depth);
        let total = (depth as u64 + 1) * plan.bits_per_sub_id as u64;
        prop_assert!(total > 64 * (plan.num_words as u64 - 1));
    }
}
