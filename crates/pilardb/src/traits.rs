use crate::model::descriptor::EntityDescriptor;

///
/// Entity
///
/// Implemented by user types stored in an arena. The descriptor is the
/// single registration input: it names the entity, enumerates its storable
/// fields with compiled accessors, and declares relations and indexes.
///
/// `Default` is the construction path for materialization; embedded
/// sub-objects come into existence through it before leaf fields are
/// populated.
///

pub trait Entity: Clone + Default + Send + Sync + 'static {
    fn descriptor() -> EntityDescriptor<Self>;
}
