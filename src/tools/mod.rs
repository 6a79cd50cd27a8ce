pub mod object_uploader;
