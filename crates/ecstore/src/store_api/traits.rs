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

use super::*;

#[async_trait::async_trait]
pub trait ObjectIO: Send + Sync + Debug + 'static {
    async fn get_object_reader(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<GetObjectReader>;

    async fn put_object(&self, bucket: &str, object: &str, data: &mut PutObjReader, opts: &ObjectOptions) -> Result<ObjectInfo>;
}

/// Bucket-level storage operations.
#[async_trait::async_trait]
pub trait BucketOperations: Send + Sync + Debug {
    async fn make_bucket(&self, bucket: &str, opts: &MakeBucketOptions) -> Result<()>;
    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo>;
    async fn list_bucket(&self) -> Result<Vec<BucketInfo>>;
    async fn delete_bucket(&self, bucket: &str, opts: &DeleteBucketOptions) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ObjectOperations: Send + Sync + Debug {
    async fn get_object_info(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<ObjectInfo>;
    async fn delete_object(&self, bucket: &str, object: &str, opts: ObjectOptions) -> Result<ObjectInfo>;
}

/// Merged listings over every drive.
#[async_trait::async_trait]
pub trait ListOperations: Send + Sync + Debug {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<ListObjectsInfo>;

    #[allow(clippy::too_many_arguments)]
    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
        fetch_owner: bool,
        start_after: Option<String>,
    ) -> Result<ListObjectsV2Info>;
}

/// Multipart upload operations.
#[async_trait::async_trait]
pub trait MultipartOperations: Send + Sync + Debug {
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<String>,
        upload_id_marker: Option<String>,
        delimiter: Option<String>,
        max_uploads: usize,
    ) -> Result<ListMultipartsInfo>;
    async fn new_multipart_upload(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<MultipartUploadResult>;
    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: &mut PutObjReader,
        opts: &ObjectOptions,
    ) -> Result<PartInfo>;
    async fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: Option<usize>,
        max_parts: usize,
    ) -> Result<ListPartsInfo>;
    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()>;
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
        opts: &ObjectOptions,
    ) -> Result<ObjectInfo>;
}

/// Healing and repair operations.
#[async_trait::async_trait]
pub trait HealOperations: Send + Sync + Debug {
    /// Re-read the reference format from the drives and swap it in.
    async fn reload_format(&self, dry_run: bool) -> Result<()>;
    /// A second element of `Some(Error::NoHealRequired)` means nothing was unformatted.
    async fn heal_format(&self, dry_run: bool) -> Result<(HealResultItem, Option<Error>)>;
    async fn heal_bucket(&self, bucket: &str, opts: &HealOpts) -> Result<HealResultItem>;
    async fn heal_object(&self, bucket: &str, object: &str, opts: &HealOpts) -> Result<HealResultItem>;
    /// Heal every object under `prefix` that a heal listing reports as degraded.
    async fn heal_objects(&self, bucket: &str, prefix: &str, opts: &HealOpts) -> Result<Vec<HealResultItem>>;
    async fn list_buckets_heal(&self) -> Result<Vec<BucketInfo>>;
    async fn list_objects_heal(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<ListObjectsInfo>;
}

/// Everything the request handlers need from the storage core.
///
/// Consumers can depend on a sub-trait (e.g. `BucketOperations`) when they
/// don't need the full surface.
#[async_trait::async_trait]
pub trait ObjectLayer:
    ObjectIO + BucketOperations + ObjectOperations + ListOperations + MultipartOperations + HealOperations + Debug
{
    async fn storage_info(&self) -> rustfs_madmin::StorageInfo;
    fn set_drive_counts(&self) -> Vec<usize>;
    /// Stop background tasks and close every drive handle.
    async fn shutdown(&self);
}
