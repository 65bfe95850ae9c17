pub(crate) mod layer_tree;
pub(crate) mod visual_subtree;
