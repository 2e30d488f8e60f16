// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Formatting replaced drives and swapping fresh handles into the topology.

use crate::connection::find_disk_index;
use crate::disk::error::DiskError;
use crate::disk::format::{FormatV3, OFFLINE_DISK_UUID};
use crate::disk::{
    DiskAPI, DiskOption, DiskStore, RUSTFS_META_BUCKET, RUSTFS_META_MULTIPART_BUCKET, RUSTFS_META_TMP_BUCKET,
};
use crate::error::{Error, Result};
use crate::monitor::ConnectionMonitor;
use crate::store_init::{
    check_format_erasure_values, formats_to_drives_info, get_format_erasure_in_quorum, init_disks, load_format_erasure_all,
    save_format_file,
};
use crate::topology::{DiskCoord, Topology};
use futures::future::join_all;
use std::collections::HashSet;
use rustfs_common::heal_channel::DriveState;
use rustfs_madmin::heal_commands::{HealResultItem, HEAL_ITEM_METADATA};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealFormatState {
    Scanning,
    Validating,
    AllocatingUuids,
    Persisting,
    Swapping,
    Done,
    Failed,
}

/// One run of format healing over every endpoint of the topology.
#[derive(Debug)]
pub struct FormatHealer<'a> {
    topology: &'a Topology,
    monitor: &'a ConnectionMonitor,
    dry_run: bool,
    state: HealFormatState,
}

impl<'a> FormatHealer<'a> {
    pub fn new(topology: &'a Topology, monitor: &'a ConnectionMonitor, dry_run: bool) -> Self {
        Self {
            topology,
            monitor,
            dry_run,
            state: HealFormatState::Scanning,
        }
    }

    pub fn state(&self) -> HealFormatState {
        self.state
    }

    fn enter(&mut self, next: HealFormatState) {
        debug!("heal format: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// `Some(Error::NoHealRequired)` in the second slot means no drive was unformatted.
    pub async fn run(&mut self) -> Result<(HealResultItem, Option<Error>)> {
        match self.heal().await {
            Ok(res) => {
                self.enter(HealFormatState::Done);
                Ok(res)
            }
            Err(e) => {
                error!("heal format failed in {:?}: {e}", self.state);
                self.enter(HealFormatState::Failed);
                Err(e)
            }
        }
    }

    async fn heal(&mut self) -> Result<(HealResultItem, Option<Error>)> {
        let topology = self.topology;
        let drives_per_set = topology.drives_per_set();
        let endpoints = topology.endpoints().endpoints.as_ref();

        self.enter(HealFormatState::Scanning);
        let (disks, _) = init_disks(endpoints, &DiskOption::default()).await;
        let (mut formats, mut errs) = load_format_erasure_all(&disks, true).await;

        self.enter(HealFormatState::Validating);
        if let Err(e) = self.validate(&formats).await {
            close_all(&disks).await;
            return Err(e);
        }
        exclude_root_disks(&disks, &mut formats, &mut errs).await;

        let mut item = HealResultItem {
            heal_item_type: HEAL_ITEM_METADATA.to_owned(),
            detail: "disk-format".to_owned(),
            disk_count: topology.total_drives(),
            set_count: topology.set_count(),
            ..Default::default()
        };
        item.before.drives = formats_to_drives_info(endpoints, &formats, &errs);
        item.after.drives = item.before.drives.clone();

        self.enter(HealFormatState::AllocatingUuids);
        let reference = match get_format_erasure_in_quorum(&formats) {
            Ok(fm) => fm,
            Err(e) => {
                close_all(&disks).await;
                return Err(e);
            }
        };

        let unformatted: Vec<usize> = errs
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Some(DiskError::UnformattedDisk)))
            .map(|(i, _)| i)
            .collect();

        if unformatted.is_empty() {
            info!("all drive formats are consistent, no heal required");
            close_all(&disks).await;
            return Ok((item, Some(Error::NoHealRequired)));
        }

        let marked = mark_uuids_offline(&reference, &formats);
        let replacements = assign_offline_slots(&marked, &unformatted, drives_per_set);
        if replacements.is_empty() {
            warn!("{} blank drive(s) found but no slot is offline", unformatted.len());
            close_all(&disks).await;
            return Ok((item, Some(Error::NoHealRequired)));
        }

        // slots nobody replaced keep their identity, the drive may only be unreachable
        let mut next = reference;
        for r in &replacements {
            next.erasure.sets[r.coord.set.0][r.coord.slot.0] = r.id;
            item.after.drives[r.index].uuid = r.id.to_string();
            item.after.drives[r.index].state = DriveState::Ok.to_string();
        }

        if let Err(e) = check_assigned_slots_preserved(&marked, &next) {
            close_all(&disks).await;
            return Err(e);
        }

        if self.dry_run {
            info!("dry run: {} drive(s) would be formatted", replacements.len());
            close_all(&disks).await;
            return Ok((item, None));
        }

        self.enter(HealFormatState::Persisting);
        let persisted = persist_formats(&disks, &mut formats, &replacements, &next).await;
        for (r, ok) in replacements.iter().zip(&persisted) {
            if !*ok {
                item.after.drives[r.index] = item.before.drives[r.index].clone();
            }
        }
        info!(
            "formatted {}/{} replaced drive(s)",
            persisted.iter().filter(|ok| **ok).count(),
            replacements.len()
        );

        self.enter(HealFormatState::Swapping);
        let flat = place_by_identity(&next, disks, &formats, drives_per_set).await;
        swap_in(topology, self.monitor, next, flat).await;

        Ok((item, None))
    }

    // Every readable format must describe the same layout as the live one.
    async fn validate(&self, formats: &[Option<FormatV3>]) -> Result<()> {
        check_format_erasure_values(formats, self.topology.drives_per_set())?;

        let current = self.topology.format().await;
        for (i, fm) in formats.iter().enumerate() {
            if let Some(fm) = fm {
                if let Err(e) = current.check_structure(fm) {
                    error!("drive {} has an incompatible format: {e}", self.topology.endpoints().endpoints.get_string(i));
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

/// Root-mounted drives are left out unless every drive is root-mounted.
async fn exclude_root_disks(disks: &[Option<DiskStore>], formats: &mut [Option<FormatV3>], errs: &mut [Option<DiskError>]) {
    let futures = disks.iter().map(|disk| async move {
        match disk {
            Some(disk) => disk.disk_info().await.ok().map(|info| info.root_disk),
            None => None,
        }
    });
    let roots: Vec<Option<bool>> = join_all(futures).await;

    let known: Vec<bool> = roots.iter().flatten().copied().collect();
    if known.is_empty() || known.iter().all(|r| *r) {
        return;
    }

    for (i, root) in roots.iter().enumerate() {
        if *root == Some(true) {
            warn!("drive {i} is on the root mount, excluding it");
            formats[i] = None;
            errs[i] = Some(DiskError::DriveIsRoot);
        }
    }
}

/// A blank drive at endpoint `index` taking over the offline slot `coord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Replacement {
    pub index: usize,
    pub coord: DiskCoord,
    pub id: Uuid,
}

/// Copy of `reference` where every identity no readable drive reports is
/// replaced by [`OFFLINE_DISK_UUID`].
pub(crate) fn mark_uuids_offline(reference: &FormatV3, formats: &[Option<FormatV3>]) -> FormatV3 {
    let present: HashSet<Uuid> = formats.iter().flatten().map(|fm| fm.erasure.this).collect();

    let mut marked = reference.clone();
    for id in marked.erasure.sets.iter_mut().flatten() {
        if !present.contains(id) {
            *id = OFFLINE_DISK_UUID;
        }
    }
    marked
}

/// Hand the offline slots of each set to the blank drives of that set, in
/// endpoint order. Blank drives left over get nothing.
pub(crate) fn assign_offline_slots(marked: &FormatV3, unformatted: &[usize], drives_per_set: usize) -> Vec<Replacement> {
    let mut replacements = Vec::new();

    for (set, slots) in marked.erasure.sets.iter().enumerate() {
        let mut offline = slots
            .iter()
            .enumerate()
            .filter(|(_, id)| **id == OFFLINE_DISK_UUID)
            .map(|(slot, _)| DiskCoord::new(set, slot));

        for &index in unformatted
            .iter()
            .filter(|&&i| DiskCoord::from_flat(i, drives_per_set).set.0 == set)
        {
            match offline.next() {
                Some(coord) => replacements.push(Replacement {
                    index,
                    coord,
                    id: Uuid::new_v4(),
                }),
                None => {
                    warn!("blank drive {index} has no offline slot in set {set}");
                    break;
                }
            }
        }
    }

    replacements
}

/// Every slot still held by a readable drive must carry the same identity in `next`.
pub(crate) fn check_assigned_slots_preserved(marked: &FormatV3, next: &FormatV3) -> Result<()> {
    for (i, (old, new)) in marked.erasure.sets.iter().zip(next.erasure.sets.iter()).enumerate() {
        for (j, (a, b)) in old.iter().zip(new.iter()).enumerate() {
            if *a != OFFLINE_DISK_UUID && a != b {
                error!("heal would reassign live slot {i}:{j} from {a} to {b}");
                return Err(Error::InconsistentDisk);
            }
        }
    }
    Ok(())
}

/// Write `next` to every reachable drive. Returns, per replacement, whether
/// its new format landed.
async fn persist_formats(
    disks: &[Option<DiskStore>],
    formats: &mut [Option<FormatV3>],
    replacements: &[Replacement],
    next: &FormatV3,
) -> Vec<bool> {
    let futures = disks.iter().enumerate().map(|(i, disk)| {
        let healing = replacements.iter().find(|r| r.index == i).map(|r| r.id);
        let this = healing.or_else(|| formats[i].as_ref().map(|fm| fm.erasure.this));
        let target = this.map(|this| next.with_this(this));

        async move {
            let (Some(disk), Some(fm)) = (disk, target) else {
                return None;
            };

            if healing.is_some() {
                if let Err(e) = disk
                    .make_volumes(vec![RUSTFS_META_BUCKET, RUSTFS_META_MULTIPART_BUCKET, RUSTFS_META_TMP_BUCKET])
                    .await
                {
                    warn!("create meta volumes on {}: {e}", disk.to_string());
                    return Some(Err(e));
                }
            }

            let fm = Some(fm);
            match save_format_file(&Some(disk.clone()), &fm).await {
                Ok(()) => Some(Ok(fm)),
                Err(e) => {
                    warn!("save format on {}: {e}", disk.to_string());
                    Some(Err(e))
                }
            }
        }
    });

    let results = join_all(futures).await;

    let mut persisted = vec![false; replacements.len()];
    for (i, res) in results.into_iter().enumerate() {
        if let Some(Ok(fm)) = res {
            formats[i] = fm;
            if let Some(pos) = replacements.iter().position(|r| r.index == i) {
                persisted[pos] = true;
            }
        }
    }
    persisted
}

/// Order freshly opened drives by the slot their identity claims in
/// `reference`. Drives that fit nowhere are closed.
pub async fn place_by_identity(
    reference: &FormatV3,
    disks: Vec<Option<DiskStore>>,
    formats: &[Option<FormatV3>],
    drives_per_set: usize,
) -> Vec<Option<DiskStore>> {
    let mut flat: Vec<Option<DiskStore>> = vec![None; reference.drives()];
    let mut rejected = Vec::new();

    for (disk, fm) in disks.into_iter().zip(formats) {
        let Some(disk) = disk else {
            continue;
        };
        let Some(fm) = fm else {
            rejected.push(disk);
            continue;
        };

        match find_disk_index(reference, fm) {
            Ok(coord) => match flat.get_mut(coord.to_flat(drives_per_set)) {
                Some(slot @ None) => *slot = Some(disk),
                _ => {
                    error!("drive {} claims occupied slot {coord}", disk.to_string());
                    rejected.push(disk);
                }
            },
            Err(e) => {
                debug!("drive {} left out: {e}", disk.to_string());
                rejected.push(disk);
            }
        }
    }

    for disk in rejected {
        let _ = disk.close().await;
    }
    flat
}

/// Install `reference` and `flat` as the live topology while the monitor is paused.
pub async fn swap_in(topology: &Topology, monitor: &ConnectionMonitor, reference: FormatV3, flat: Vec<Option<DiskStore>>) {
    monitor.pause().await;
    let evicted = topology.swap(reference.with_this(Uuid::nil()), flat).await;
    monitor.resume();

    for disk in evicted {
        let _ = disk.close().await;
    }
    info!("drive table swapped");
}

/// Re-read the quorum format from the drives and swap it in with fresh handles.
pub async fn reload_format(topology: &Topology, monitor: &ConnectionMonitor, dry_run: bool) -> Result<()> {
    let (disks, _) = init_disks(topology.endpoints().endpoints.as_ref(), &DiskOption::default()).await;
    let (formats, _) = load_format_erasure_all(&disks, false).await;

    let reference = match get_format_erasure_in_quorum(&formats) {
        Ok(fm) => fm,
        Err(e) => {
            close_all(&disks).await;
            return Err(e);
        }
    };

    if let Err(e) = topology.format().await.check_structure(&reference) {
        error!("reloaded format does not match the running layout: {e}");
        close_all(&disks).await;
        return Err(e.into());
    }

    if dry_run {
        close_all(&disks).await;
        return Ok(());
    }

    let flat = place_by_identity(&reference, disks, &formats, topology.drives_per_set()).await;
    swap_in(topology, monitor, reference, flat).await;
    Ok(())
}

async fn close_all(disks: &[Option<DiskStore>]) {
    join_all(disks.iter().flatten().map(|disk| disk.close())).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_formats(reference: &FormatV3, present: &[(usize, usize)]) -> Vec<Option<FormatV3>> {
        let dps = reference.drives_per_set();
        let mut formats = vec![None; reference.drives()];
        for &(set, slot) in present {
            formats[DiskCoord::new(set, slot).to_flat(dps)] = Some(reference.with_this(reference.erasure.sets[set][slot]));
        }
        formats
    }

    #[test]
    fn test_mark_uuids_offline() {
        let reference = FormatV3::new(2, 2);
        let formats = drive_formats(&reference, &[(0, 0), (1, 0), (1, 1)]);

        let marked = mark_uuids_offline(&reference, &formats);
        assert!(marked.is_offline_at(DiskCoord::new(0, 1)));
        assert_eq!(marked.erasure.sets[0][0], reference.erasure.sets[0][0]);
        assert_eq!(marked.erasure.sets[1], reference.erasure.sets[1]);
    }

    #[test]
    fn test_blank_drive_takes_the_offline_slot_not_its_position() {
        // slot 0's drive died, slot 3's drive now sits at endpoint 0 and endpoint 3 is blank
        let reference = FormatV3::new(1, 4);
        let mut formats = drive_formats(&reference, &[(0, 1), (0, 2)]);
        formats[0] = Some(reference.with_this(reference.erasure.sets[0][3]));

        let marked = mark_uuids_offline(&reference, &formats);
        assert!(marked.is_offline_at(DiskCoord::new(0, 0)));
        assert!(!marked.is_offline_at(DiskCoord::new(0, 3)));

        let replacements = assign_offline_slots(&marked, &[3], 4);
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements[0].index, 3);
        assert_eq!(replacements[0].coord, DiskCoord::new(0, 0));
    }

    #[test]
    fn test_assignment_stays_within_the_set() {
        let reference = FormatV3::new(2, 2);
        let formats = drive_formats(&reference, &[(0, 0), (0, 1), (1, 1)]);
        let marked = mark_uuids_offline(&reference, &formats);

        // endpoint 1 is blank but set 0 has no offline slot
        let replacements = assign_offline_slots(&marked, &[1, 2], 2);
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements[0].index, 2);
        assert_eq!(replacements[0].coord, DiskCoord::new(1, 0));
    }

    #[test]
    fn test_live_slots_must_be_preserved() {
        let reference = FormatV3::new(1, 4);
        let formats = drive_formats(&reference, &[(0, 1), (0, 2), (0, 3)]);
        let marked = mark_uuids_offline(&reference, &formats);

        let mut next = reference.clone();
        next.erasure.sets[0][0] = Uuid::new_v4();
        assert!(check_assigned_slots_preserved(&marked, &next).is_ok());

        next.erasure.sets[0][3] = Uuid::new_v4();
        assert!(matches!(
            check_assigned_slots_preserved(&marked, &next),
            Err(Error::InconsistentDisk)
        ));
    }
}
