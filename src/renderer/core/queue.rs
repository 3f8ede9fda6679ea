use ash::prelude::VkResult;
use ash::vk;
use smallvec::SmallVec;
use thiserror::Error;

/// Queue roles a device is asked to provide
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueRoles {
    pub graphics: bool,
    pub compute: bool,
    pub presentation: bool,
}

impl QueueRoles {
    pub const fn new(graphics: bool, compute: bool, presentation: bool) -> Self {
        Self {
            graphics,
            compute,
            presentation,
        }
    }

    pub fn any(&self) -> bool {
        self.graphics || self.compute || self.presentation
    }
}

/// Queue family index per role; `None` means unassigned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub compute: Option<u32>,
    pub presentation: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn shared(index: u32) -> Self {
        Self {
            graphics: Some(index),
            compute: Some(index),
            presentation: Some(index),
        }
    }

    /// Requested roles that have no family assigned
    pub fn missing(&self, roles: QueueRoles) -> QueueRoles {
        QueueRoles {
            graphics: roles.graphics && self.graphics.is_none(),
            compute: roles.compute && self.compute.is_none(),
            presentation: roles.presentation && self.presentation.is_none(),
        }
    }

    /// Keeps only the indices of the requested roles
    pub fn restricted_to(&self, roles: QueueRoles) -> Self {
        Self {
            graphics: self.graphics.filter(|_| roles.graphics),
            compute: self.compute.filter(|_| roles.compute),
            presentation: self.presentation.filter(|_| roles.presentation),
        }
    }

    /// Assigned indices without duplicates, in graphics, compute, presentation order
    pub fn distinct(&self) -> SmallVec<[u32; 3]> {
        let mut indices = SmallVec::new();
        for index in [self.graphics, self.compute, self.presentation]
            .into_iter()
            .flatten()
        {
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
        indices
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("The device exposes no queue families")]
    NoQueueFamilies,

    #[error("No queue family provides the requested roles {0:?}")]
    MissingRoles(QueueRoles),

    #[error("Failed to query surface support: {0}")]
    SurfaceSupport(vk::Result),
}

impl ResolveError {
    pub fn status(&self) -> Option<vk::Result> {
        match self {
            Self::SurfaceSupport(result) => Some(*result),
            _ => None,
        }
    }
}

/// Single left-to-right pass over `families` assigning a family to each requested role.
///
/// A family that can do graphics, compute and presentation at once takes all three roles
/// and ends the scan. A graphics+compute family is otherwise preferred for those two roles,
/// and ends the scan when no presentation is needed. Remaining roles go to the first family
/// that supports them. Roles that were requested but not matched stay `None`.
///
/// `supports_present` is only called when presentation is requested.
pub fn scan_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    roles: QueueRoles,
    mut supports_present: F,
) -> Result<QueueFamilyIndices, ResolveError>
where
    F: FnMut(u32) -> VkResult<bool>,
{
    if families.is_empty() {
        return Err(ResolveError::NoQueueFamilies);
    }

    let mut found = QueueFamilyIndices::default();
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        let graphics = roles.graphics && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let compute = roles.compute && family.queue_flags.contains(vk::QueueFlags::COMPUTE);
        let present = if roles.presentation {
            supports_present(index).map_err(ResolveError::SurfaceSupport)?
        } else {
            false
        };

        if graphics && compute {
            if present {
                found = QueueFamilyIndices::shared(index);
                break;
            }
            if found.graphics != found.compute || found.graphics.is_none() {
                found.graphics = Some(index);
                found.compute = Some(index);
            }
            if !roles.presentation {
                break;
            }
        }
        if graphics && found.graphics.is_none() {
            found.graphics = Some(index);
        }
        if compute && found.compute.is_none() {
            found.compute = Some(index);
        }
        if present && found.presentation.is_none() {
            found.presentation = Some(index);
        }
    }

    Ok(found)
}

/// Like [`scan_queue_families`], but fails unless every requested role was matched.
pub fn resolve_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    roles: QueueRoles,
    supports_present: F,
) -> Result<QueueFamilyIndices, ResolveError>
where
    F: FnMut(u32) -> VkResult<bool>,
{
    let found = scan_queue_families(families, roles, supports_present)?;
    let missing = found.missing(roles);
    if missing.any() {
        return Err(ResolveError::MissingRoles(missing));
    }
    Ok(found)
}

/// Resolution state of one role on one physical device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoleSlot {
    #[default]
    Untried,
    NotFound,
    Found(u32),
}

impl RoleSlot {
    fn from_index(index: Option<u32>) -> Self {
        index.map_or(Self::NotFound, Self::Found)
    }

    fn index(self) -> Option<u32> {
        match self {
            Self::Found(index) => Some(index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// Every requested role is known
    Resolved(QueueFamilyIndices),
    /// At least one requested role was never searched for
    Unresolved,
    /// A requested role was searched for before and not found
    KnownMissing(QueueRoles),
}

/// Remembered resolution results for one physical device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachedQueueFamilies {
    pub graphics: RoleSlot,
    pub compute: RoleSlot,
    pub presentation: RoleSlot,
}

impl CachedQueueFamilies {
    pub fn lookup(&self, roles: QueueRoles) -> CacheLookup {
        let requested = [
            (roles.graphics, self.graphics),
            (roles.compute, self.compute),
            (roles.presentation, self.presentation),
        ];

        let not_found = |(wanted, slot): (bool, RoleSlot)| wanted && slot == RoleSlot::NotFound;
        if requested.iter().copied().any(not_found) {
            return CacheLookup::KnownMissing(QueueRoles {
                graphics: not_found(requested[0]),
                compute: not_found(requested[1]),
                presentation: not_found(requested[2]),
            });
        }

        if requested
            .iter()
            .any(|(wanted, slot)| *wanted && *slot == RoleSlot::Untried)
        {
            return CacheLookup::Unresolved;
        }

        CacheLookup::Resolved(QueueFamilyIndices {
            graphics: self.graphics.index().filter(|_| roles.graphics),
            compute: self.compute.index().filter(|_| roles.compute),
            presentation: self.presentation.index().filter(|_| roles.presentation),
        })
    }

    /// Records the outcome of a scan for the requested roles only
    pub fn record(&mut self, roles: QueueRoles, found: &QueueFamilyIndices) {
        if roles.graphics {
            self.graphics = RoleSlot::from_index(found.graphics);
        }
        if roles.compute {
            self.compute = RoleSlot::from_index(found.compute);
        }
        if roles.presentation {
            self.presentation = RoleSlot::from_index(found.presentation);
        }
    }

    /// Marks every requested role as unavailable
    pub fn record_failure(&mut self, roles: QueueRoles) {
        self.record(roles, &QueueFamilyIndices::default());
    }

    /// Presentation support is a property of one surface; a new surface needs a rescan
    pub fn forget_presentation(&mut self) {
        self.presentation = RoleSlot::Untried;
    }
}

pub struct Queue {
    pub family_index: u32,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(family_index: u32, handle: vk::Queue) -> Self {
        Self {
            family_index,
            handle,
        }
    }
}

/// Queue handles retrieved from the logical device, one per resolved role
#[derive(Default)]
pub struct Queues {
    pub graphics: Option<Queue>,
    pub compute: Option<Queue>,
    pub presentation: Option<Queue>,
}

impl Queues {
    pub fn retrieve(device: &ash::Device, indices: &QueueFamilyIndices) -> Self {
        let get = |index: Option<u32>| {
            index.map(|index| {
                let handle = unsafe { device.get_device_queue(index, 0) };
                Queue::new(index, handle)
            })
        };
        Self {
            graphics: get(indices.graphics),
            compute: get(indices.compute),
            presentation: get(indices.presentation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn present_on(supported: &'static [u32]) -> impl FnMut(u32) -> VkResult<bool> {
        move |index| Ok(supported.contains(&index))
    }

    const ALL: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    #[test]
    fn one_family_for_everything() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(ALL),
            family(vk::QueueFlags::COMPUTE),
        ];
        let found = resolve_queue_families(
            &families,
            QueueRoles::new(true, true, true),
            present_on(&[1, 2]),
        )
        .unwrap();
        assert_eq!(found, QueueFamilyIndices::shared(1));
    }

    #[test]
    fn split_graphics_and_compute_present() {
        // family 0 graphics only, family 1 compute + presentation
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let found = resolve_queue_families(
            &families,
            QueueRoles::new(true, true, true),
            present_on(&[1]),
        )
        .unwrap();
        assert_eq!(found.graphics, Some(0));
        assert_eq!(found.compute, Some(1));
        assert_eq!(found.presentation, Some(1));
    }

    #[test]
    fn graphics_compute_family_preferred_without_surface() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(ALL),
            family(ALL),
        ];
        let mut queried = false;
        let found = resolve_queue_families(
            &families,
            QueueRoles::new(true, true, false),
            |_| {
                queried = true;
                Ok(true)
            },
        )
        .unwrap();
        assert!(!queried);
        assert_eq!(found.graphics, Some(1));
        assert_eq!(found.compute, Some(1));
        assert_eq!(found.presentation, None);
    }

    #[test]
    fn graphics_compute_family_with_separate_present() {
        let families = [
            family(ALL),
            family(vk::QueueFlags::TRANSFER),
        ];
        let found = resolve_queue_families(
            &families,
            QueueRoles::new(true, true, true),
            present_on(&[1]),
        )
        .unwrap();
        assert_eq!(found.graphics, Some(0));
        assert_eq!(found.compute, Some(0));
        assert_eq!(found.presentation, Some(1));
    }

    #[test]
    fn unrequested_roles_stay_unassigned() {
        let families = [family(ALL)];
        let found = resolve_queue_families(
            &families,
            QueueRoles::new(true, false, false),
            present_on(&[0]),
        )
        .unwrap();
        assert_eq!(found.graphics, Some(0));
        assert_eq!(found.compute, None);
        assert_eq!(found.presentation, None);
    }

    #[test]
    fn resolution_is_deterministic() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(ALL),
        ];
        let roles = QueueRoles::new(true, true, true);
        let first = resolve_queue_families(&families, roles, present_on(&[0, 1])).unwrap();
        for _ in 0..4 {
            let again = resolve_queue_families(&families, roles, present_on(&[0, 1])).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn missing_role_is_reported() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let err = resolve_queue_families(
            &families,
            QueueRoles::new(true, true, true),
            present_on(&[0]),
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::MissingRoles(QueueRoles::new(false, true, false)));
    }

    #[test]
    fn empty_family_list_fails() {
        let err = resolve_queue_families(&[], QueueRoles::new(true, false, false), present_on(&[]))
            .unwrap_err();
        assert_eq!(err, ResolveError::NoQueueFamilies);
    }

    #[test]
    fn surface_query_error_aborts_scan() {
        let families = [family(ALL)];
        let err = resolve_queue_families(
            &families,
            QueueRoles::new(true, true, true),
            |_| Err(vk::Result::ERROR_SURFACE_LOST_KHR),
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::SurfaceSupport(vk::Result::ERROR_SURFACE_LOST_KHR));
    }

    #[test]
    fn distinct_indices_are_deduplicated() {
        let indices = QueueFamilyIndices {
            graphics: Some(0),
            compute: Some(0),
            presentation: Some(2),
        };
        assert_eq!(indices.distinct().as_slice(), &[0, 2]);
        assert_eq!(QueueFamilyIndices::shared(1).distinct().as_slice(), &[1]);
        assert!(QueueFamilyIndices::default().distinct().is_empty());
    }

    #[test]
    fn cache_starts_unresolved() {
        let cache = CachedQueueFamilies::default();
        assert_eq!(cache.lookup(QueueRoles::new(true, false, false)), CacheLookup::Unresolved);
    }

    #[test]
    fn cache_returns_recorded_indices() {
        let roles = QueueRoles::new(true, true, false);
        let mut cache = CachedQueueFamilies::default();
        cache.record(
            roles,
            &QueueFamilyIndices {
                graphics: Some(0),
                compute: Some(1),
                presentation: None,
            },
        );
        assert_eq!(
            cache.lookup(roles),
            CacheLookup::Resolved(QueueFamilyIndices {
                graphics: Some(0),
                compute: Some(1),
                presentation: None,
            })
        );
        // a subset of the roles is answered from the cache as well
        assert_eq!(
            cache.lookup(QueueRoles::new(true, false, false)),
            CacheLookup::Resolved(QueueFamilyIndices {
                graphics: Some(0),
                compute: None,
                presentation: None,
            })
        );
    }

    #[test]
    fn cached_failure_is_not_retried() {
        let roles = QueueRoles::new(true, true, false);
        let mut cache = CachedQueueFamilies::default();
        cache.record(
            roles,
            &QueueFamilyIndices {
                graphics: Some(0),
                compute: None,
                presentation: None,
            },
        );
        assert_eq!(
            cache.lookup(roles),
            CacheLookup::KnownMissing(QueueRoles::new(false, true, false))
        );
        // still failing once a surface shows up
        assert_eq!(
            cache.lookup(QueueRoles::new(true, true, true)),
            CacheLookup::KnownMissing(QueueRoles::new(false, true, false))
        );
    }

    #[test]
    fn attaching_a_surface_retries_presentation() {
        let mut cache = CachedQueueFamilies::default();
        cache.record(
            QueueRoles::new(true, false, false),
            &QueueFamilyIndices {
                graphics: Some(0),
                compute: None,
                presentation: None,
            },
        );
        assert_eq!(cache.lookup(QueueRoles::new(true, false, true)), CacheLookup::Unresolved);
    }

    #[test]
    fn new_surface_rescans_presentation() {
        let roles = QueueRoles::new(true, false, true);
        let mut cache = CachedQueueFamilies::default();
        cache.record(
            roles,
            &QueueFamilyIndices {
                graphics: Some(0),
                compute: None,
                presentation: Some(1),
            },
        );
        assert!(matches!(cache.lookup(roles), CacheLookup::Resolved(_)));

        cache.forget_presentation();
        assert_eq!(cache.lookup(roles), CacheLookup::Unresolved);
        assert_eq!(cache.graphics, RoleSlot::Found(0));
        assert_eq!(
            cache.lookup(QueueRoles::new(true, false, false)),
            CacheLookup::Resolved(QueueFamilyIndices {
                graphics: Some(0),
                compute: None,
                presentation: None,
            })
        );
    }

    #[test]
    fn failed_device_records_every_role() {
        let roles = QueueRoles::new(true, false, true);
        let mut cache = CachedQueueFamilies::default();
        cache.record_failure(roles);
        assert_eq!(cache.graphics, RoleSlot::NotFound);
        assert_eq!(cache.compute, RoleSlot::Untried);
        assert_eq!(cache.presentation, RoleSlot::NotFound);
    }
}
