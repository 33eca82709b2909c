//! Domain factories for creating value objects.

use super::InstanceId;

/// Factory for generating InstanceId instances.
///
/// Each server process generates one id at startup and tags everything it
/// publishes on the bridge with it.
pub struct InstanceIdFactory;

impl InstanceIdFactory {
    /// Generate a new InstanceId with a random UUID v4.
    pub fn generate() -> InstanceId {
        InstanceId::from_uuid(uuid::Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_factory_generate() {
        // テスト項目: InstanceIdFactory::generate() で UUID v4 形式の ID を生成できる
        // when (操作):
        let instance_id = InstanceIdFactory::generate();

        // then (期待する結果):
        assert_eq!(instance_id.to_string().len(), 36); // UUID v4 の標準長（ハイフン含む）
        assert_eq!(instance_id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_instance_id_factory_generate_uniqueness() {
        // テスト項目: InstanceIdFactory::generate() は毎回異なる ID を生成する
        // when (操作):
        let id1 = InstanceIdFactory::generate();
        let id2 = InstanceIdFactory::generate();

        // then (期待する結果):
        assert_ne!(id1, id2);
    }
}
