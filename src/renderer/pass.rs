// renderer/pass.rs

/// One sweep over the scene. Passes of a paint always run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPass {
    Shadow,         // Light's view into the shadow map
    DofDepth,       // Blur amount into the depth-of-field alpha buffer
    ColorUnblended, // Confidently opaque fragments, depth writes on
    ColorBlended,   // Everything else, back to front, depth writes off
}

/// Per-entity storage a pass builds its pipeline into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    ShadowOrMask,
    ColorUnblended,
    ColorBlended,
}

impl CacheSlot {
    pub const ALL: [CacheSlot; 3] = [
        CacheSlot::ShadowOrMask,
        CacheSlot::ColorUnblended,
        CacheSlot::ColorBlended,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            CacheSlot::ShadowOrMask => 0,
            CacheSlot::ColorUnblended => 1,
            CacheSlot::ColorBlended => 2,
        }
    }
}

impl RenderPass {
    pub const ALL: [RenderPass; 4] = [
        RenderPass::Shadow,
        RenderPass::DofDepth,
        RenderPass::ColorUnblended,
        RenderPass::ColorBlended,
    ];

    /// Shadow and depth-of-field only need the silhouette, so they share
    /// the mask slot.
    pub fn cache_slot(self) -> CacheSlot {
        match self {
            RenderPass::Shadow | RenderPass::DofDepth => CacheSlot::ShadowOrMask,
            RenderPass::ColorUnblended => CacheSlot::ColorUnblended,
            RenderPass::ColorBlended => CacheSlot::ColorBlended,
        }
    }

    /// Blended geometry is drawn furthest first; everything else nearest
    /// first to get early depth rejection.
    pub fn requires_back_to_front_sort(self) -> bool {
        matches!(self, RenderPass::ColorBlended)
    }

    pub fn is_color(self) -> bool {
        matches!(self, RenderPass::ColorUnblended | RenderPass::ColorBlended)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            RenderPass::Shadow => 0,
            RenderPass::DofDepth => 1,
            RenderPass::ColorUnblended => 2,
            RenderPass::ColorBlended => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RenderPass::Shadow => "shadow",
            RenderPass::DofDepth => "dof-depth",
            RenderPass::ColorUnblended => "color-unblended",
            RenderPass::ColorBlended => "color-blended",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_passes_share_a_slot() {
        assert_eq!(RenderPass::Shadow.cache_slot(), CacheSlot::ShadowOrMask);
        assert_eq!(RenderPass::DofDepth.cache_slot(), CacheSlot::ShadowOrMask);
        assert_ne!(
            RenderPass::ColorUnblended.cache_slot(),
            RenderPass::ColorBlended.cache_slot()
        );
    }

    #[test]
    fn only_blended_sorts_back_to_front() {
        let back_to_front: Vec<_> = RenderPass::ALL
            .iter()
            .filter(|p| p.requires_back_to_front_sort())
            .collect();
        assert_eq!(back_to_front, vec![&RenderPass::ColorBlended]);
    }

    #[test]
    fn indices_are_dense() {
        for (i, pass) in RenderPass::ALL.iter().enumerate() {
            assert_eq!(pass.index(), i);
        }
        for (i, slot) in CacheSlot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), i);
        }
    }
}
