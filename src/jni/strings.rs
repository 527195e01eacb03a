use jni::objects::{JObject, JObjectArray};
use jni::sys::jsize;
use jni::JNIEnv;

use crate::error::Result;

/// Build a `String[]` from Rust strings
///
/// # Errors
/// Returns an error if the array or any element cannot be allocated
pub fn new_string_array<'local>(
    env: &mut JNIEnv<'local>,
    items: &[String],
) -> Result<JObjectArray<'local>> {
    let string_class = env.find_class("java/lang/String")?;
    let array = env.new_object_array(items.len() as jsize, &string_class, JObject::null())?;

    for (i, item) in items.iter().enumerate() {
        let element = env.new_string(item)?;
        env.set_object_array_element(&array, i as jsize, &element)?;
        env.delete_local_ref(element)?;
    }

    Ok(array)
}
