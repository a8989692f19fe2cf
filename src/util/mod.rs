/*!
 This module defines common utilities used across the readers and the unarchiver.
*/

pub mod dates;
