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

use crate::disk::endpoint::Endpoint;
use crate::disk::error_reduce::{count_errs, reduce_write_quorum_errs};
use crate::disk::{self, DiskAPI};
use crate::error::{Error, Result};
use crate::{
    disk::{
        error::DiskError,
        format::{FormatErasureVersion, FormatMetaVersion, FormatV3, OFFLINE_DISK_UUID},
        new_disk, DiskOption, DiskStore, FORMAT_CONFIG_FILE, RUSTFS_META_BUCKET,
    },
    topology::DiskCoord,
};
use futures::future::join_all;
use rustfs_common::heal_channel::DriveState;
use rustfs_madmin::heal_commands::HealDriveInfo;
use tracing::{info, warn};
use uuid::Uuid;

/// Open a handle for every endpoint, in flat order.
pub async fn init_disks(eps: &[Endpoint], opt: &DiskOption) -> (Vec<Option<DiskStore>>, Vec<Option<DiskError>>) {
    let futures = eps.iter().map(|ep| new_disk(ep, opt));

    let mut res = Vec::with_capacity(eps.len());
    let mut errors = Vec::with_capacity(eps.len());

    for result in join_all(futures).await {
        match result {
            Ok(s) => {
                res.push(Some(s));
                errors.push(None);
            }
            Err(e) => {
                res.push(None);
                errors.push(Some(e));
            }
        }
    }

    (res, errors)
}

/// Read the formats of `disks` and agree on one, formatting fresh disks when
/// the deployment is brand new.
pub async fn connect_load_init_formats(
    first_disk: bool,
    disks: &[Option<DiskStore>],
    set_count: usize,
    set_drive_count: usize,
    deployment_id: Option<Uuid>,
) -> Result<FormatV3> {
    let (formats, errs) = load_format_erasure_all(disks, false).await;

    check_disk_fatal_errs(&errs)?;

    check_format_erasure_values(&formats, set_drive_count)?;

    if should_init_erasure_disks(&errs) {
        if !first_disk {
            return Err(Error::FirstDiskWait);
        }

        info!("formatting {} drive(s) into {set_count} set(s) of {set_drive_count}", disks.len());
        return init_format_erasure(disks, set_count, set_drive_count, deployment_id).await;
    }

    let unformatted = quorum_unformatted_disks(&errs);
    if unformatted && !first_disk {
        return Err(Error::NotFirstDisk);
    }

    if unformatted && first_disk {
        return Err(Error::FirstDiskWait);
    }

    get_format_erasure_in_quorum(&formats)
}

pub fn quorum_unformatted_disks(errs: &[Option<DiskError>]) -> bool {
    count_errs(errs, &DiskError::UnformattedDisk) > (errs.len() / 2)
}

/// Every reachable disk is unformatted and more than half are reachable.
pub fn should_init_erasure_disks(errs: &[Option<DiskError>]) -> bool {
    let unformatted = count_errs(errs, &DiskError::UnformattedDisk);
    let unreachable = count_errs(errs, &DiskError::DiskNotFound);
    unformatted > errs.len() / 2 && unformatted + unreachable == errs.len()
}

pub fn check_disk_fatal_errs(errs: &[Option<DiskError>]) -> disk::error::Result<()> {
    if errs.is_empty() {
        return Ok(());
    }

    if count_errs(errs, &DiskError::FileAccessDenied) == errs.len() {
        return Err(DiskError::FileAccessDenied);
    }

    if count_errs(errs, &DiskError::DiskNotDir) == errs.len() {
        return Err(DiskError::DiskNotDir);
    }

    Ok(())
}

async fn init_format_erasure(
    disks: &[Option<DiskStore>],
    set_count: usize,
    set_drive_count: usize,
    deployment_id: Option<Uuid>,
) -> Result<FormatV3> {
    let mut fm = FormatV3::new(set_count, set_drive_count);
    if let Some(id) = deployment_id {
        fm.id = id;
    }

    let mut fms = vec![None; disks.len()];
    for (flat, slot) in fms.iter_mut().enumerate() {
        let coord = DiskCoord::from_flat(flat, set_drive_count);
        if let Some(this) = fm.uuid_at(coord) {
            *slot = Some(fm.with_this(this));
        }
    }

    save_format_file_all(disks, &fms).await?;

    get_format_erasure_in_quorum(&fms)
}

/// The format shared by a strict majority of `formats`, with `this` cleared.
pub fn get_format_erasure_in_quorum(formats: &[Option<FormatV3>]) -> Result<FormatV3> {
    let mut groups: Vec<(FormatV3, usize)> = Vec::new();

    for f in formats.iter().flatten() {
        let key = f.with_this(Uuid::nil());
        match groups.iter_mut().find(|(g, _)| *g == key) {
            Some((_, count)) => *count += 1,
            None => groups.push((key, 1)),
        }
    }

    let best = groups.into_iter().max_by_key(|(_, count)| *count);

    match best {
        Some((format, count)) if format.drives() > 0 && count > formats.len() / 2 => Ok(format),
        _ => {
            warn!("no format in quorum among {} drive(s)", formats.len());
            Err(Error::ErasureReadQuorum)
        }
    }
}

pub fn check_format_erasure_values(formats: &[Option<FormatV3>], set_drive_count: usize) -> Result<()> {
    for f in formats.iter().flatten() {
        check_format_erasure_value(f)?;

        if formats.len() != f.drives() {
            return Err(Error::other(format!(
                "format has {} drive(s) but {} are configured",
                f.drives(),
                formats.len()
            )));
        }

        if f.erasure.sets.iter().any(|set| set.len() != set_drive_count) {
            return Err(Error::other("erasure set length does not match set_drive_count"));
        }
    }
    Ok(())
}

fn check_format_erasure_value(format: &FormatV3) -> Result<()> {
    if format.version != FormatMetaVersion::V1 {
        return Err(Error::other("invalid FormatMetaVersion"));
    }

    if format.erasure.version != FormatErasureVersion::V3 {
        return Err(Error::other("invalid FormatErasureVersion"));
    }
    Ok(())
}

/// Read every disk's format.json. With `heal` the drive usage is attached to each format.
pub async fn load_format_erasure_all(disks: &[Option<DiskStore>], heal: bool) -> (Vec<Option<FormatV3>>, Vec<Option<DiskError>>) {
    let futures = disks.iter().map(|disk| async move {
        match disk {
            Some(disk) => load_format_erasure(disk, heal).await,
            None => Err(DiskError::DiskNotFound),
        }
    });

    let mut datas = Vec::with_capacity(disks.len());
    let mut errors = Vec::with_capacity(disks.len());

    for (disk, result) in disks.iter().zip(join_all(futures).await) {
        match result {
            Ok(s) => {
                if !heal {
                    if let Some(disk) = disk {
                        let _ = disk.set_disk_id(Some(s.erasure.this)).await;
                    }
                }

                datas.push(Some(s));
                errors.push(None);
            }
            Err(e) => {
                datas.push(None);
                errors.push(Some(e));
            }
        }
    }

    (datas, errors)
}

pub async fn load_format_erasure(disk: &DiskStore, heal: bool) -> disk::error::Result<FormatV3> {
    let data = disk
        .read_all(RUSTFS_META_BUCKET, FORMAT_CONFIG_FILE)
        .await
        .map_err(|e| match e {
            DiskError::FileNotFound | DiskError::VolumeNotFound => DiskError::UnformattedDisk,
            _ => {
                warn!("load_format_erasure err: {:?} {:?}", disk.to_string(), e);
                e
            }
        })?;

    if data.is_empty() {
        return Err(DiskError::UnformattedDisk);
    }

    let mut fm = FormatV3::try_from(data.as_ref()).map_err(|e| {
        warn!("corrupted format on {}: {e}", disk.to_string());
        DiskError::CorruptedFormat
    })?;

    if heal {
        fm.disk_info = Some(disk.disk_info().await?);
    }

    Ok(fm)
}

async fn save_format_file_all(disks: &[Option<DiskStore>], formats: &[Option<FormatV3>]) -> disk::error::Result<()> {
    let futures = disks.iter().zip(formats.iter()).map(|(disk, fm)| save_format_file(disk, fm));

    let errors: Vec<Option<DiskError>> = join_all(futures).await.into_iter().map(|r| r.err()).collect();

    if let Some(e) = reduce_write_quorum_errs(&errors, &[], disks.len() / 2 + 1) {
        return Err(e);
    }

    Ok(())
}

/// Write `format` to `disk` through a temporary file, then remember the identity.
pub async fn save_format_file(disk: &Option<DiskStore>, format: &Option<FormatV3>) -> disk::error::Result<()> {
    let Some(disk) = disk else {
        return Err(DiskError::DiskNotFound);
    };

    let Some(format) = format else {
        return Err(DiskError::other("format is none"));
    };

    let json_data = format.to_json()?;

    let tmpfile = Uuid::new_v4().to_string();

    disk.write_all(RUSTFS_META_BUCKET, tmpfile.as_str(), json_data.into_bytes().into())
        .await?;

    disk.rename_file(RUSTFS_META_BUCKET, tmpfile.as_str(), RUSTFS_META_BUCKET, FORMAT_CONFIG_FILE)
        .await?;

    disk.set_disk_id(Some(format.erasure.this)).await?;

    Ok(())
}

/// Drive state derived from the outcome of reading a drive's format.
pub fn drive_state_from(err: Option<&DiskError>) -> DriveState {
    match err {
        None => DriveState::Ok,
        Some(DiskError::UnformattedDisk) => DriveState::Missing,
        Some(DiskError::DiskNotFound) => DriveState::Offline,
        Some(_) => DriveState::Corrupt,
    }
}

/// Per-drive heal view of a format scan, in flat order.
pub fn formats_to_drives_info(
    endpoints: &[Endpoint],
    formats: &[Option<FormatV3>],
    errs: &[Option<DiskError>],
) -> Vec<HealDriveInfo> {
    endpoints
        .iter()
        .enumerate()
        .map(|(i, ep)| {
            let format = formats.get(i).and_then(|f| f.as_ref());
            let err = errs.get(i).and_then(|e| e.as_ref());
            let state = match (format, err) {
                (Some(_), _) => DriveState::Ok,
                (None, None) => DriveState::Offline,
                (None, err) => drive_state_from(err),
            };

            let uuid = match format {
                Some(fm) if fm.erasure.this != OFFLINE_DISK_UUID => fm.erasure.this.to_string(),
                _ => String::new(),
            };

            HealDriveInfo {
                uuid,
                endpoint: ep.to_string(),
                state: state.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    async fn open_disks(root: &Path, n: usize) -> (Vec<Endpoint>, Vec<Option<DiskStore>>) {
        let mut eps = Vec::new();
        for i in 0..n {
            let p = root.join(format!("d{i}"));
            std::fs::create_dir_all(&p).unwrap();
            eps.push(Endpoint::try_from(p.to_str().unwrap()).unwrap());
        }
        let (disks, errs) = init_disks(&eps, &DiskOption::default()).await;
        assert!(errs.iter().all(|e| e.is_none()));
        (eps, disks)
    }

    #[test]
    fn test_should_init_erasure_disks() {
        let u = Some(DiskError::UnformattedDisk);
        let n = Some(DiskError::DiskNotFound);
        assert!(should_init_erasure_disks(&[u.clone(), u.clone(), u.clone(), u.clone()]));
        assert!(should_init_erasure_disks(&[u.clone(), u.clone(), u.clone(), n.clone()]));
        assert!(!should_init_erasure_disks(&[u.clone(), u.clone(), n.clone(), n.clone()]));
        assert!(!should_init_erasure_disks(&[u.clone(), u.clone(), u, None]));
    }

    #[test]
    fn test_format_in_quorum_needs_strict_majority() {
        let fm = FormatV3::new(1, 4);
        let copies: Vec<Option<FormatV3>> = (0..4)
            .map(|j| fm.uuid_at(DiskCoord::new(0, j)).map(|id| fm.with_this(id)))
            .collect();

        let quorum = get_format_erasure_in_quorum(&copies).unwrap();
        assert!(quorum.erasure.this.is_nil());
        assert_eq!(quorum.erasure.sets, fm.erasure.sets);

        let half = vec![copies[0].clone(), copies[1].clone(), None, None];
        assert!(matches!(get_format_erasure_in_quorum(&half), Err(Error::ErasureReadQuorum)));

        let other = FormatV3::new(1, 4);
        let split = vec![copies[0].clone(), copies[1].clone(), Some(other.clone()), Some(other)];
        assert!(matches!(get_format_erasure_in_quorum(&split), Err(Error::ErasureReadQuorum)));
    }

    #[tokio::test]
    async fn test_connect_load_init_formats_formats_fresh_disks() {
        let dir = tempfile::tempdir().unwrap();
        let (_, disks) = open_disks(dir.path(), 4).await;

        assert!(matches!(
            connect_load_init_formats(false, &disks, 1, 4, None).await,
            Err(Error::FirstDiskWait)
        ));

        let fm = connect_load_init_formats(true, &disks, 1, 4, None).await.unwrap();
        assert_eq!(fm.drives(), 4);

        for (j, disk) in disks.iter().enumerate() {
            let id = disk.as_ref().unwrap().get_disk_id().await.unwrap();
            assert_eq!(id, fm.uuid_at(DiskCoord::new(0, j)));
        }

        // a second boot reads the same format back
        let again = connect_load_init_formats(true, &disks, 1, 4, None).await.unwrap();
        assert_eq!(again, fm);
    }

    #[tokio::test]
    async fn test_drives_info_states() {
        let dir = tempfile::tempdir().unwrap();
        let (eps, disks) = open_disks(dir.path(), 4).await;
        let fm = connect_load_init_formats(true, &disks, 1, 4, None).await.unwrap();

        std::fs::remove_file(dir.path().join("d1/.rustfs.sys/format.json")).unwrap();
        std::fs::write(dir.path().join("d2/.rustfs.sys/format.json"), b"{garbage").unwrap();
        let mut disks = disks;
        disks[3] = None;

        let (formats, errs) = load_format_erasure_all(&disks, false).await;
        let infos = formats_to_drives_info(&eps, &formats, &errs);
        let states: Vec<_> = infos.iter().map(|d| d.state.as_str()).collect();
        assert_eq!(states, vec!["ok", "missing", "corrupt", "offline"]);
        assert_eq!(infos[0].uuid, fm.uuid_at(DiskCoord::new(0, 0)).unwrap().to_string());
    }
}
