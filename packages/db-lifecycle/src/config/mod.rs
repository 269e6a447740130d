pub mod db;
pub mod descriptor;
