use std::ffi::{c_char, CStr, CString};

/// Ordered set of layer or extension names
#[derive(Debug, Default, Clone)]
pub struct NameRegistry {
    names: Vec<CString>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `name` unless an identical name is already present.
    /// Returns whether the name was newly added.
    pub fn add(&mut self, name: &CStr) -> bool {
        if self.contains(name) {
            return false;
        }
        self.names.push(name.to_owned());
        true
    }

    pub fn contains(&self, name: &CStr) -> bool {
        self.names.iter().any(|n| n.as_c_str() == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.names.iter().map(|n| n.as_c_str())
    }

    /// Pointers for Vulkan create infos, valid while `self` is not mutated
    pub fn as_ptrs(&self) -> Vec<*const c_char> {
        self.names.iter().map(|n| n.as_ptr()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_ignored() {
        let mut registry = NameRegistry::new();
        assert!(registry.add(c"VK_KHR_surface"));
        assert!(registry.add(c"VK_KHR_xcb_surface"));
        assert!(!registry.add(c"VK_KHR_surface"));
        assert!(!registry.add(c"VK_KHR_xcb_surface"));

        assert_eq!(registry.len(), 2);
        let names = registry.iter().collect::<Vec<_>>();
        assert_eq!(names, vec![c"VK_KHR_surface", c"VK_KHR_xcb_surface"]);
    }

    #[test]
    fn each_distinct_name_appears_once() {
        let inserts = [
            c"VK_EXT_debug_utils",
            c"VK_KHR_surface",
            c"VK_EXT_debug_utils",
            c"VK_KHR_win32_surface",
            c"VK_KHR_surface",
            c"VK_KHR_surface",
        ];
        let mut registry = NameRegistry::new();
        for name in inserts {
            registry.add(name);
        }

        for name in inserts {
            assert_eq!(registry.iter().filter(|n| *n == name).count(), 1);
        }
        assert_eq!(registry.len(), 3);
        // first-seen order
        assert_eq!(registry.iter().next(), Some(c"VK_EXT_debug_utils"));
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let mut registry = NameRegistry::new();
        registry.add(c"VK_LAYER_KHRONOS_validation");
        registry.add(c"vk_layer_khronos_validation");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn pointers_follow_names() {
        let mut registry = NameRegistry::new();
        registry.add(c"VK_KHR_swapchain");
        let ptrs = registry.as_ptrs();
        assert_eq!(ptrs.len(), 1);
        let name = unsafe { CStr::from_ptr(ptrs[0]) };
        assert_eq!(name, c"VK_KHR_swapchain");
    }
}
